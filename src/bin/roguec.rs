//! roguec - compile a textual IR shader (`.rir`) and print the Rogue shader.

use std::path::PathBuf;
use std::process::ExitCode;

use bumpalo::Bump;
use clap::{Parser, ValueEnum};
use thiserror::Error;

use rogue::core::{BuildContext, CompilerOptions, DebugFlags, PipelineLayout, Stage};
use rogue::ir::parse_ir;

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Until {
    /// Stop after instruction selection.
    Isel,
    /// Run the whole pass pipeline.
    Passes,
}

/// Rogue shader compiler backend
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Input .rir file
    input: PathBuf,

    /// Override the shader stage declared in the file (vs, fs, cs)
    #[arg(long, value_parser = parse_stage)]
    stage: Option<Stage>,

    /// Comma-separated debug flags, as in ROGUE_DEBUG (nir, ir, ir_passes, ir_details, vld_skip, vld_nonfatal)
    #[arg(long)]
    debug: Option<String>,

    /// The device's texture unit clamps array layers itself
    #[arg(long)]
    tpu_array_textures: bool,

    /// Use the zero-based dummy pipeline layout
    #[arg(long, conflicts_with_all = ["layout_desc_set_table", "layout_push_consts", "layout_image_base", "layout_sampler_base"])]
    dummy_layout: bool,

    /// Shared register pair of the descriptor set table address
    #[arg(long)]
    layout_desc_set_table: Option<u32>,

    /// Shared register pair of the push constant buffer address
    #[arg(long)]
    layout_push_consts: Option<u32>,

    /// First shared register of the image state words
    #[arg(long)]
    layout_image_base: Option<u32>,

    /// First shared register of the sampler state words
    #[arg(long)]
    layout_sampler_base: Option<u32>,

    /// How far to compile
    #[arg(long, value_enum, default_value = "passes")]
    until: Until,

    /// Collect every validation error instead of aborting on the first
    #[arg(long)]
    nonfatal: bool,
}

#[derive(Debug, Error)]
enum DriverError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Parse(#[from] rogue::ir::ParseError),
    #[error("compilation aborted")]
    Aborted,
}

fn parse_stage(s: &str) -> Result<Stage, String> {
    Stage::from_name(s).ok_or_else(|| format!("unknown stage '{s}', expected vs, fs or cs"))
}

impl Cli {
    fn options(&self) -> CompilerOptions {
        let mut options = CompilerOptions::from_env();
        if let Some(flags) = &self.debug {
            options.debug = DebugFlags::parse(flags);
        }
        if self.nonfatal {
            options.debug.vld_nonfatal = true;
        }
        options.device.tpu_array_textures = self.tpu_array_textures;

        let explicit = self.layout_desc_set_table.is_some()
            || self.layout_push_consts.is_some()
            || self.layout_image_base.is_some()
            || self.layout_sampler_base.is_some();
        if self.dummy_layout {
            options.pipeline_layout = Some(PipelineLayout::dummy());
        } else if explicit {
            options.pipeline_layout = Some(PipelineLayout {
                desc_set_table_offset: self.layout_desc_set_table.unwrap_or(0),
                push_consts_offset: self.layout_push_consts.unwrap_or(0),
                image_base: self.layout_image_base.unwrap_or(0),
                sampler_base: self.layout_sampler_base.unwrap_or(0),
                ..PipelineLayout::default()
            });
        }
        options
    }
}

fn main() -> ExitCode {
    env_logger::init();
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<(), DriverError> {
    let cli = Cli::parse();

    let source = std::fs::read_to_string(&cli.input).map_err(|source| DriverError::Read {
        path: cli.input.clone(),
        source,
    })?;
    let mut ir = parse_ir(&source)?;
    if let Some(stage) = cli.stage {
        ir.stage = stage;
    }

    let options = cli.options();
    let details = options.debug.ir_details;
    let until = cli.until;

    // Aborts panic with the rendered error; the message has already been logged.
    let compiled = std::panic::catch_unwind(move || {
        let arena = Bump::new();
        let ctx = BuildContext::new(&arena, options);
        let shader = match until {
            Until::Isel => rogue::isel::select(&ctx, &ir),
            Until::Passes => rogue::compile(&ctx, &ir),
        };
        log::debug!("{}", ctx.stats());
        shader.display(details).to_string()
    });

    match compiled {
        Ok(text) => {
            print!("{text}");
            Ok(())
        }
        Err(_) => Err(DriverError::Aborted),
    }
}
