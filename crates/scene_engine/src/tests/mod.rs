//! Scenario tests spanning several subsystems

mod scene_scenarios;
