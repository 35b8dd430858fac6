//! Demonstrates the positioner kinematics: forward kinematics, inverse kinematics for a
//! measurement point on the sample and the animated move to the found configuration.

use std::f64::consts::PI;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use nalgebra::Vector3;
use tracing::info;

use rs_goniometer::chain::{FkOptions, KinematicChain};
use rs_goniometer::inverse::{IkLocal, IkSolver, IkTarget};
use rs_goniometer::joint::{Joint, JointType};
use rs_goniometer::parameters::solver::SolverParameters;
use rs_goniometer::pose::Pose;
use rs_goniometer::sequence::Sequence;
use rs_goniometer::utils::{dump_joints, dump_pose};

/// Positioner kinematics demo.
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// YAML file with inverse kinematics solver parameters.
    #[arg(short, long)]
    solver: Option<PathBuf>,

    /// Number of animation steps.
    #[arg(long, default_value_t = 25)]
    steps: usize,

    /// Duration of the animation in milliseconds.
    #[arg(long, default_value_t = 500)]
    duration: u64,

    /// Positioning tolerance of the inverse kinematics.
    #[arg(long, default_value_t = 1e-3)]
    tolerance: f64,
}

/// Positioning table with x, y and z stages carrying an omega rotation stage about z.
fn positioning_table() -> Result<KinematicChain> {
    let joints = vec![
        Joint::new(Vector3::z(), Vector3::zeros(), JointType::Revolute, 0.0, Some(-PI), Some(PI))?
            .with_name("Omega Stage")
            .with_mesh("omega_stage"),
        Joint::new(Vector3::y(), Vector3::zeros(), JointType::Prismatic, 0.0, Some(-200.0), Some(200.0))?
            .with_name("Y Stage")
            .with_mesh("y_stage"),
        Joint::new(Vector3::x(), Vector3::zeros(), JointType::Prismatic, 0.0, Some(-200.0), Some(200.0))?
            .with_name("X Stage")
            .with_mesh("x_stage"),
        Joint::new(Vector3::z(), Vector3::zeros(), JointType::Prismatic, 0.0, Some(-250.0), Some(250.0))?
            .with_name("Z Stage")
            .with_mesh("z_stage"),
    ];
    let base = Pose::from_translation(Vector3::new(0.0, 0.0, -500.0));
    let tool = Pose::from_translation(Vector3::new(0.0, 0.0, 50.0));
    Ok(KinematicChain::new(joints, Some(base), Some(tool))
        .with_name("Positioning Table")
        .with_base_mesh("base"))
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("rs_goniometer=info".parse()?)
                .add_directive("warn".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let parameters = match &cli.solver {
        Some(path) => SolverParameters::from_yaml_file(path)?,
        None => SolverParameters::default(),
    };
    println!("Solver parameters:\n{}", parameters.to_yaml());

    let mut positioner = positioning_table()?;
    println!("{} with {} joints", positioner.name, positioner.number_of_joints());

    let q = [PI / 4.0, 20.0, -10.0, 30.0];
    let pose = positioner.compute_forward_kinematics(&q, &FkOptions::default())?;
    print!("Forward kinematics of ");
    dump_joints(&positioner, &q);
    dump_pose(&pose);

    // Bring a point 10 mm off the sample centre to the instrument gauge volume with the
    // sample normal facing x
    let local = IkLocal { point: Vector3::new(10.0, 0.0, 0.0), direction: Vector3::x() };
    let target = IkTarget { position: Vector3::new(5.0, -15.0, -420.0), direction: Vector3::y() };
    let start = positioner.configuration();
    let bounds = positioner.bounds();

    let solver = IkSolver::new(parameters, cli.tolerance);
    let solution = solver.solve(&mut positioner, &target, &local, &bounds, None)?;
    info!(
        "Inverse kinematics {}: cost {:e} in {} evaluations",
        if solution.converged { "converged" } else { "did not converge" },
        solution.cost,
        solution.evaluations
    );
    print!("Solution ");
    dump_joints(&positioner, &solution.configuration);

    // Animate from the start configuration to the solution, set points stay at the solution
    positioner.move_to(&start, &FkOptions::intermediate())?;
    let duration = Duration::from_millis(cli.duration);
    let frames = {
        let positioner = &mut positioner;
        let mut sequence = Sequence::new(
            |row: &[f64]| {
                if let Ok(pose) = positioner.move_to(row, &FkOptions::intermediate()) {
                    dump_pose(&pose);
                }
            },
            &start,
            &solution.configuration,
            duration,
            cli.steps,
        )?;
        sequence.start();
        let tick = Duration::from_millis(20);
        let mut elapsed = Duration::ZERO;
        while sequence.is_running() {
            elapsed += tick;
            sequence.tick(elapsed);
        }
        sequence.trajectory().steps()
    };
    info!("Animated {} frames", frames);

    print!("Final configuration ");
    dump_joints(&positioner, &positioner.configuration());
    print!("Set points ");
    dump_joints(&positioner, &positioner.set_points());
    Ok(())
}
