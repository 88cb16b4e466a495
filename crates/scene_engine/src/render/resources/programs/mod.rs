//! Shader program assembly and caching

pub mod cache;
pub mod parameters;
pub mod program;
pub mod shader_lib;

pub use cache::{ProgramCache, ProgramId};
pub use parameters::{
    get_parameters, get_program_cache_key, ObjectFeatures, ProgramContext, ProgramFeatures, ProgramParameters,
};
pub use program::{build_sources, CompileStatus, Program, ProgramDiagnostics, MAX_MORPH_TARGETS};

use thiserror::Error;

/// Errors raised while assembling program sources
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProgramError {
    /// An `#include` names a chunk the library does not have
    #[error("Unknown shader chunk <{0}>")]
    MissingChunk(String),

    /// Includes nest deeper than the resolver allows (likely a cycle)
    #[error("Shader includes nested too deeply")]
    IncludeDepthExceeded,

    /// No built-in program exists for the material type
    #[error("Unknown shader '{0}'")]
    UnknownShader(String),

    /// Backend refused the program
    #[error("Backend error: {0}")]
    Backend(String),
}
