use anyhow::{Context, Result};
use renderer::{Renderer, ShaderProgram};
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command};
use crate::settings::{self, ResolvedSettings};

pub fn run(cli: Cli) -> Result<()> {
    initialise_tracing();

    let settings = settings::resolve(&cli.run)?;
    match cli.command {
        Some(Command::Config) => print_config(&settings),
        Some(Command::Check) => check(&settings),
        None => run_sketch(&settings),
    }
}

fn run_sketch(settings: &ResolvedSettings) -> Result<()> {
    let config = settings.renderer_config();
    if config.export.capture {
        tracing::info!(
            out = %config.export.output_dir.display(),
            start = config.export.frame_start,
            end = config.export.frame_end,
            rate = config.export.frame_rate,
            "capture enabled"
        );
    }
    Renderer::new(config).run()
}

fn print_config(settings: &ResolvedSettings) -> Result<()> {
    print!("{}", settings.describe()?);
    Ok(())
}

fn check(settings: &ResolvedSettings) -> Result<()> {
    let config = settings.renderer_config();
    let program = ShaderProgram::load(&config.shader)?;
    if let Some(dir) = &config.dump_wrapped {
        program.dump(dir)?;
    }
    program.validate().with_context(|| {
        format!(
            "shader pair {} / {} did not validate",
            config.shader.vertex.display(),
            config.shader.fragment.display()
        )
    })?;
    println!(
        "ok: {} / {}",
        config.shader.vertex.display(),
        config.shader.fragment.display()
    );
    Ok(())
}

fn initialise_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
