use anyhow::Context;
use blockflow::logger::{LogFormat, Logger};
use blockflow::runtime::{parse_csv, parse_json, EngineConfig, InvocationParams};
use clap::{Parser, ValueEnum};
use std::path::PathBuf;

/// Runs one activity block of a flow configuration.
#[derive(Debug, Parser)]
#[command(name = "blockflow", version)]
struct Args {
    #[arg(long, env = "BLOCKFLOW_FLOW_CONFIG_URL")]
    flow_config_url: Option<String>,

    #[arg(long, env = "BLOCKFLOW_ACTIVITY_BLOCK_ID")]
    activity_block_id: Option<String>,

    #[arg(long, env = "BLOCKFLOW_FLOW_RUN_ID")]
    flow_run_id: Option<String>,

    #[arg(long, env = "BLOCKFLOW_ACTIVITY_NAME")]
    activity_name: Option<String>,

    #[arg(long, env = "BLOCKFLOW_ACTIVITY_ID")]
    activity_id: Option<String>,

    #[arg(long, env = "BLOCKFLOW_ACTIVITY_MODULE")]
    activity_module: Option<String>,

    #[arg(long, env = "BLOCKFLOW_ACTIVITY_TYPE")]
    activity_type: Option<String>,

    /// JSON object
    #[arg(long, env = "BLOCKFLOW_ACTIVITY_CONFIG")]
    activity_config: Option<String>,

    /// JSON object
    #[arg(long, env = "BLOCKFLOW_ACTIVITY_INPUT")]
    activity_input: Option<String>,

    /// Comma separated extension names
    #[arg(long, env = "BLOCKFLOW_ADDITIONAL_EXTENSIONS")]
    additional_extensions: Option<String>,

    /// JSON value handed to listeners
    #[arg(long, env = "BLOCKFLOW_CUSTOM_DATA")]
    custom_data: Option<String>,

    /// Directory receiving `context/` and `skip_with_outputs/`
    #[arg(long, env = "BLOCKFLOW_OUTPUT_DIR", default_value = ".")]
    output_dir: PathBuf,

    /// Directory keeping the context of every flow run, needed for reruns
    /// across processes. Defaults to `<output-dir>/runs`.
    #[arg(long, env = "BLOCKFLOW_CONTEXT_DIR")]
    context_dir: Option<PathBuf>,

    /// Skip writing the context dump and the skip-with-outputs file
    #[arg(long)]
    no_persist: bool,

    #[arg(long, value_enum, env = "BLOCKFLOW_LOG_FORMAT", default_value_t = LogFormatArg::Text)]
    log_format: LogFormatArg,

    /// Print the run report as JSON on stdout
    #[arg(long)]
    report_json: bool,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormatArg {
    Text,
    Json,
}

impl From<LogFormatArg> for LogFormat {
    fn from(value: LogFormatArg) -> Self {
        match value {
            LogFormatArg::Text => LogFormat::Text,
            LogFormatArg::Json => LogFormat::Json,
        }
    }
}

impl Args {
    fn params(&self) -> anyhow::Result<InvocationParams> {
        let json = |name: &str, raw: &Option<String>| {
            raw.as_deref().map(|raw| parse_json(name, raw)).transpose()
        };

        Ok(InvocationParams {
            flow_config_url: self.flow_config_url.clone(),
            activity_block_id: self.activity_block_id.clone(),
            flow_run_id: self.flow_run_id.clone(),
            activity_name: self.activity_name.clone(),
            activity_id: self.activity_id.clone(),
            activity_module: self.activity_module.clone(),
            activity_type: self.activity_type.clone(),
            activity_config: json("activity-config", &self.activity_config)?,
            activity_input: json("activity-input", &self.activity_input)?,
            additional_extensions: self
                .additional_extensions
                .as_deref()
                .map(parse_csv)
                .unwrap_or_default(),
            custom_data: json("custom-data", &self.custom_data)?,
        })
    }

    fn engine_config(&self) -> EngineConfig {
        let context_dir = self
            .context_dir
            .clone()
            .unwrap_or_else(|| self.output_dir.join("runs"));
        EngineConfig::default()
            .output_dir(&self.output_dir)
            .context_dir(context_dir)
            .persist(!self.no_persist)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    Logger::init_with_format(args.log_format.into());

    let params = args.params()?;
    let engine = blockflow::engine_builder()
        .config(args.engine_config())
        .build();

    let report = engine
        .run(params)
        .await
        .context("block run did not complete")?;
    tracing::info!(
        flow_run_id = %report.flow_run_id,
        status = %report.status,
        "block run finished"
    );

    if args.report_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    // Any terminal status exits 0; the report carries the outcome.
    Ok(())
}
