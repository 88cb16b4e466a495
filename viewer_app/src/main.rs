//! Headless scene viewer
//!
//! Builds a small scene (a scattered field of cubes, an outline loop, a point
//! cloud and a sprite), renders a few frames through the recording backend
//! and picks at the center of the screen. Settings come from an optional
//! TOML/RON file given as the first argument.

use rand::prelude::*;
use scene_engine::foundation::logging;
use scene_engine::prelude::*;

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const FRAMES: usize = 3;
const CUBES: usize = 24;

/// Nodes the frame loop touches
struct DemoScene {
    scene: Scene,
    camera: NodeId,
    spinner: NodeId,
}

fn cube_geometry(size: f32) -> Result<BufferGeometry, GeometryError> {
    let h = size * 0.5;
    let corners = [
        Vec3::new(-h, -h, -h),
        Vec3::new(h, -h, -h),
        Vec3::new(h, h, -h),
        Vec3::new(-h, h, -h),
        Vec3::new(-h, -h, h),
        Vec3::new(h, -h, h),
        Vec3::new(h, h, h),
        Vec3::new(-h, h, h),
    ];
    let mut geometry = BufferGeometry::from_positions(&corners);
    geometry.name = "cube".to_string();
    geometry.set_index(vec![
        4, 5, 6, 4, 6, 7, // +z
        1, 0, 3, 1, 3, 2, // -z
        5, 1, 2, 5, 2, 6, // +x
        0, 4, 7, 0, 7, 3, // -x
        7, 6, 2, 7, 2, 3, // +y
        0, 1, 5, 0, 5, 4, // -y
    ]);
    geometry.compute_vertex_normals()?;
    geometry.compute_bounding_box()?;
    geometry.compute_bounding_sphere()?;
    Ok(geometry)
}

fn build_scene(rng: &mut impl Rng) -> Result<DemoScene, Box<dyn std::error::Error>> {
    let mut scene = Scene::new();
    let root = scene.root();

    let camera = scene.add_camera(root, Camera::perspective(50.0, WIDTH as f32 / HEIGHT as f32, 0.1, 200.0))?;
    if let Some(node) = scene.graph.node_mut(camera) {
        node.set_position(Vec3::new(0.0, 4.0, 18.0));
    }
    scene.graph.look_at(camera, &Vec3::zeros());

    scene.add_light(root, Light::ambient(Vec3::new(1.0, 1.0, 1.0), 0.2))?;
    let sun = scene.add_light(root, Light::directional(Vec3::new(1.0, 0.95, 0.9), 1.5))?;
    if let Some(node) = scene.graph.node_mut(sun) {
        node.set_position(Vec3::new(5.0, 10.0, 7.5));
    }

    let cube = scene.add_geometry(cube_geometry(1.0)?);
    let spinner = scene.add_group(root)?;
    for i in 0..CUBES {
        let color = Vec3::new(rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0), rng.gen_range(0.2..1.0));
        let material = if i % 4 == 0 {
            Material::standard(color, rng.gen_range(0.1..0.9), 0.0).with_transparency(0.6)
        } else {
            Material::lambert(color)
        };
        let material = scene.add_material(material.with_name(format!("cube_{i}")));
        let node = scene.add_mesh(spinner, cube, material)?;
        if let Some(node) = scene.graph.node_mut(node) {
            node.set_position(Vec3::new(rng.gen_range(-8.0..8.0), rng.gen_range(-3.0..3.0), rng.gen_range(-8.0..8.0)));
            node.set_scale(Vec3::repeat(rng.gen_range(0.5..1.5)));
        }
    }

    // Center target for the pick
    let target = scene.add_material(Material::phong(Vec3::new(0.9, 0.2, 0.2), 30.0).with_name("target"));
    let target = scene.add_mesh(root, cube, target)?;
    if let Some(node) = scene.graph.node_mut(target) {
        node.name = "target".to_string();
    }

    let mut outline = BufferGeometry::from_positions(&[
        Vec3::new(-10.0, -4.0, -10.0),
        Vec3::new(10.0, -4.0, -10.0),
        Vec3::new(10.0, -4.0, 10.0),
        Vec3::new(-10.0, -4.0, 10.0),
    ]);
    outline.compute_bounding_sphere()?;
    let outline = scene.add_geometry(outline);
    let line_material = scene.add_material(Material::line_basic(Vec3::new(0.4, 0.8, 1.0)));
    scene.add_line(root, outline, line_material, LineTopology::Loop)?;

    let stars: Vec<Vec3> = (0..500)
        .map(|_| Vec3::new(rng.gen_range(-60.0..60.0), rng.gen_range(10.0..40.0), rng.gen_range(-60.0..-20.0)))
        .collect();
    let mut stars = BufferGeometry::from_positions(&stars);
    stars.compute_bounding_sphere()?;
    let stars = scene.add_geometry(stars);
    let star_material = scene.add_material(Material::points(Vec3::new(1.0, 1.0, 0.9), 2.0));
    scene.add_points(root, stars, star_material)?;

    let sprite_material = scene.add_material(Material::sprite(Vec3::new(1.0, 0.8, 0.2)));
    let sprite = scene.add_sprite(root, sprite_material)?;
    if let Some(node) = scene.graph.node_mut(sprite) {
        node.set_position(Vec3::new(0.0, 3.0, 0.0));
    }

    Ok(DemoScene { scene, camera, spinner })
}

fn run(config: &EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let mut rng = rand::thread_rng();
    let DemoScene { mut scene, camera, spinner } = build_scene(&mut rng)?;
    log::info!("Scene built with {} nodes", scene.graph.len());

    let mut renderer = Renderer::new(HeadlessBackend::new(), config.renderer.clone());
    renderer.set_size(WIDTH, HEIGHT, config.renderer.pixel_ratio);

    let compiled = renderer.compile(&mut scene, camera)?;
    log::info!("Prewarmed {} program(s)", compiled);

    for frame in 0..FRAMES {
        if let Some(node) = scene.graph.node_mut(spinner) {
            node.rotate_on_axis(&Vec3::y(), 0.25);
        }
        renderer.render(&mut scene, camera)?;

        let info = renderer.info();
        log::info!(
            "Frame {}: {} calls, {} triangles, {} lines, {} points, {} pending, {} programs, {} geometries",
            frame,
            info.calls,
            info.triangles,
            info.lines,
            info.points,
            info.pending,
            info.programs,
            info.geometries
        );
        log::debug!("Backend recorded {} commands", renderer.backend_mut().take_commands().len());
    }

    let mut raycaster = Raycaster::from_config(&config.picking);
    raycaster.set_from_camera(screen_to_ndc(WIDTH as f32 * 0.5, HEIGHT as f32 * 0.5, WIDTH, HEIGHT), &scene, camera)?;
    let hits = raycaster.intersect_object(&scene, scene.root(), true);
    match hits.first() {
        Some(hit) => {
            let name = scene.graph.node(hit.node).map_or("", |node| node.name.as_str());
            log::info!(
                "Pick at screen center: {} hit(s), nearest '{}' at distance {:.3} ({:.2}, {:.2}, {:.2})",
                hits.len(),
                name,
                hit.distance,
                hit.point.x,
                hit.point.y,
                hit.point.z
            );
        }
        None => log::info!("Pick at screen center: nothing hit"),
    }

    renderer.dispose();
    log::info!("Renderer disposed");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let path = std::env::args().nth(1).unwrap_or_else(|| "viewer.toml".to_string());
    let config = EngineConfig::load_or_default(&path)?;
    config.validate()?;

    if !logging::init_with_filter(&config.logging.filter) {
        eprintln!("Logger already initialized");
    }
    log::info!("Starting scene viewer ({})", path);

    match run(&config) {
        Ok(()) => {
            log::info!("Scene viewer finished");
            Ok(())
        }
        Err(e) => {
            log::error!("Scene viewer failed: {}", e);
            Err(e)
        }
    }
}
