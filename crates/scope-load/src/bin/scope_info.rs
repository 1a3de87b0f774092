use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use scope_core::CoreError;
use scope_io::Trajectory;
use scope_load::error::{LoadError, LoadResult};
use scope_load::registry::{entries, extension_of};
use scope_load::{CacheBudget, FrameData, LoaderState, TrajectoryPool};

#[derive(Parser)]
#[command(name = "scope-info", version, about = "Inspect a topology/trajectory pair")]
struct Cli {
    /// Topology file (pdb, gro, xyz, xmol, arc, cif, data)
    topology: PathBuf,
    /// Trajectory file (pdb, xtc, trr, xyz, xmol, arc); defaults to the
    /// topology file when it is trajectory-capable
    trajectory: Option<PathBuf>,
    /// Frame cache budget in MiB
    #[arg(long, default_value_t = scope_load::DEFAULT_FRAME_CACHE_MB)]
    cache_mb: u64,
    /// Frame to load and report
    #[arg(long, default_value_t = 0)]
    frame: usize,
    /// List registered formats and exit
    #[arg(long)]
    formats: bool,
}

fn unsupported(msg: String) -> LoadError {
    LoadError::Core(CoreError::Unsupported(msg))
}

fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    run_cli().map_err(|err| err.to_string())
}

fn run_cli() -> LoadResult<()> {
    let cli = Cli::parse();
    if cli.formats {
        for entry in entries() {
            let caps = match (entry.loads_molecules(), entry.loads_trajectories()) {
                (true, true) => "molecule + trajectory",
                (true, false) => "molecule",
                (false, true) => "trajectory",
                (false, false) => "none",
            };
            println!("{:<40} .{:<6} {caps}", entry.name, entry.extensions);
        }
        return Ok(());
    }

    let state = LoaderState::from_path(&cli.topology)?;
    if state.requires_dialogue() {
        return Err(unsupported(format!(
            "{}: file needs manual format disambiguation",
            cli.topology.display()
        )));
    }
    let mol_loader = state.mol_loader.ok_or_else(|| {
        unsupported(format!(
            "{}: no molecule backend for extension",
            cli.topology.display()
        ))
    })?;
    let molecule = Arc::new(mol_loader.load_molecule(&cli.topology, state.backend_arg.as_deref())?);
    println!(
        "molecule: {} atoms, {} bonded structures",
        molecule.atom_count(),
        molecule.structures().count()
    );
    if let Some(style) = &state.backend_arg {
        println!("sniffed backend argument: {style}");
    }

    let traj_path = cli.trajectory.unwrap_or_else(|| cli.topology.clone());
    let mut pool = TrajectoryPool::with_budget(CacheBudget { size_mb: cli.cache_mb });
    let handle = pool.open_file(&traj_path, None, &molecule)?;
    let traj = pool.get(handle).expect("freshly opened handle");
    let header = traj.header();
    println!(
        "trajectory: {} frames of {} atoms ({})",
        header.num_frames,
        header.num_atoms,
        extension_of(&traj_path).unwrap_or("?"),
    );
    println!("cache: {} slots", traj.cache_capacity());

    let mut frame = FrameData::default();
    pool.load_frame(handle, cli.frame, &mut frame)?;
    println!(
        "frame {}: step {}, t = {} ps, cell extent {:?}",
        cli.frame,
        frame.header.step,
        frame.header.timestamp,
        frame.header.cell.extent()
    );
    println!("cached frames: {}", pool.num_cache_frames(handle)?);

    pool.close(handle)?;
    Ok(())
}
