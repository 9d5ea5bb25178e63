use clap::Subcommand;

#[derive(Subcommand)]
pub enum Commands {
    /// Run a pipeline to completion
    Run {
        #[arg(long, help = "Pipeline spec file path (JSON)")]
        config: String,
    },
    /// Validate a pipeline spec without processing any records
    Validate {
        #[arg(long, help = "Pipeline spec file path (JSON)")]
        config: String,

        #[arg(
            long,
            help = "If set, prints the resolved plan as JSON instead of a summary"
        )]
        json: bool,
    },
    /// Show historical run metrics from a metrics root
    Metrics {
        #[arg(long, help = "Metrics root directory")]
        root: String,

        #[arg(
            long,
            help = "If set, prints the metrics as JSON instead of a table"
        )]
        json: bool,
    },
    /// List the operators available to pipeline specs
    Operators,
}
