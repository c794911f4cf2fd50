use std::sync::Arc;

use serde::Serialize;
use streamrx_pipeline::{
    frame_renderer, track_renderer, ExecutionContext, PipeSpec, PipelineBuilder, StageRegistry,
    Terminal,
};
use streamrx_worker::{WorkerConfig, WorkerOffload};

use crate::cmd::probe::probe_stages;
use crate::cmd::{runtime, CheckArgs, TerminalArg};
use crate::exit::{io_error, json_error, pipeline_error, CliResult, SUCCESS};
use crate::output::{print_json, OutputFormat};

#[derive(Debug, Serialize)]
struct CheckOutput {
    valid: bool,
    input: String,
    stages: Vec<String>,
}

pub fn run(args: CheckArgs, format: OutputFormat) -> CliResult<i32> {
    let text = match (&args.pipes, &args.file) {
        (Some(pipes), _) => pipes.clone(),
        (None, Some(path)) => std::fs::read_to_string(path)
            .map_err(|err| io_error(&format!("cannot read {}", path.display()), err))?,
        (None, None) => "[]".to_string(),
    };
    let specs: Vec<PipeSpec> =
        serde_json::from_str(&text).map_err(|err| json_error("invalid pipeline description", err))?;

    let support = if args.probe {
        let runtime = runtime()?;
        Some(runtime.block_on(probe_stages(&args.env))?.1)
    } else {
        None
    };

    let registry = StageRegistry::with_builtin_stages();
    let environment = args.env.environment(ExecutionContext::Main);
    let mut builder = PipelineBuilder::new(&registry, &environment);
    if let Some(support) = &support {
        builder = builder.with_support(support);
    }
    if !args.env.no_worker {
        builder = builder.with_offload(Arc::new(WorkerOffload::new(
            args.env.worker_factory(),
            WorkerConfig::default(),
        )));
    }

    // Building never starts a worker; only setup would.
    let pipeline = builder
        .build(terminal(args.terminal), &specs)
        .map_err(|err| pipeline_error("pipeline rejected", err))?;

    let output = CheckOutput {
        valid: true,
        input: pipeline.input_type().to_string(),
        stages: pipeline.stage_names().to_vec(),
    };
    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table | OutputFormat::Pretty => {
            println!("valid: {} -> {}", output.input, output.stages.join(" -> "));
        }
    }
    Ok(SUCCESS)
}

fn terminal(arg: TerminalArg) -> Terminal {
    match arg {
        TerminalArg::Frame => frame_renderer().0,
        TerminalArg::Track => track_renderer().0,
    }
}
