use serde::Serialize;
use streamrx_pipeline::{ExecutionContext, Probe, StageRegistry, SupportTable};
use streamrx_worker::{WorkerClient, WorkerConfig};

use crate::cmd::{parse_duration, runtime, EnvironmentArgs, ProbeArgs};
use crate::exit::{CliResult, SUCCESS};
use crate::output::{print_json, print_table, yes_no, OutputFormat};

#[derive(Debug, Serialize)]
struct ProbeOutput {
    worker: bool,
    stages: SupportTable,
}

pub fn run(args: ProbeArgs, format: OutputFormat) -> CliResult<i32> {
    let runtime = runtime()?;
    let (worker, stages) = runtime.block_on(probe_stages(&args.env))?;
    let output = ProbeOutput { worker, stages };

    match format {
        OutputFormat::Json => print_json(&output),
        OutputFormat::Table => {
            let rows = output
                .stages
                .iter()
                .map(|(name, info)| {
                    vec![
                        name.to_string(),
                        yes_no(info.execution_environment.main),
                        yes_no(info.execution_environment.worker),
                        info.supported_codecs.join(", "),
                    ]
                })
                .collect();
            print_table(&["STAGE", "MAIN", "WORKER", "CODECS"], rows);
        }
        OutputFormat::Pretty => {
            println!("worker: {}", yes_no(output.worker));
            for (name, info) in output.stages.iter() {
                println!(
                    "{name}: main={} worker={} codecs=[{}]",
                    info.execution_environment.main,
                    info.execution_environment.worker,
                    info.supported_codecs.join(", ")
                );
            }
        }
    }
    Ok(SUCCESS)
}

/// Probe every built-in stage; the worker is consulted unless disabled.
///
/// Returns whether a worker answered, and the support table.
pub async fn probe_stages(env: &EnvironmentArgs) -> CliResult<(bool, SupportTable)> {
    let registry = StageRegistry::with_builtin_stages();
    let environment = env.environment(ExecutionContext::Main);
    let probe = Probe::new(&registry, &environment);

    if env.no_worker {
        return Ok((false, probe.probe_all().await));
    }
    let config = WorkerConfig {
        check_support_timeout: parse_duration(&env.worker_timeout)?,
        ..WorkerConfig::default()
    };
    let client = WorkerClient::spawn(env.worker_factory(), config);
    let table = probe.with_worker(&client).probe_all().await;
    Ok((client.is_available().await, table))
}
