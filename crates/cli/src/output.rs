use engine_core::plan::ExecutionPlan;
use engine_processing::executor::RunSummary;
use model::metrics::{OperatorMetric, RunMetric};

pub fn print_run_summary(summary: &RunSummary) {
    let run = &summary.metrics.run;
    println!("Run '{}' ({})", summary.run_id, run.pipeline_name);
    println!("-----------------------------");
    println!("{:<22} {}", "Input records", run.total_input_records);
    println!("{:<22} {}", "Output records", run.total_output_records);
    println!("{:<22} {:.2}%", "Pass rate", run.overall_pass_rate);
    println!("{:<22} {:.2}s", "Duration", run.duration_secs);
    println!("{:<22} {:.2} rec/s", "Avg throughput", run.avg_throughput);
    println!("{:<22} {}", "Stages", run.num_stages);
    println!("{:<22} {}", "Errors", run.total_errors);

    if !summary.metrics.operators.is_empty() {
        println!();
        print_operator_table(&summary.metrics.operators);
    }
}

pub fn print_plan_summary(plan: &ExecutionPlan) {
    println!("Pipeline '{}' is valid", plan.spec.name);
    println!("-----------------------------");
    for (idx, stage) in plan.stages.iter().enumerate() {
        let operators: Vec<&str> = stage.operators.iter().map(|op| op.name()).collect();
        println!("{}. {:<18} {}", idx + 1, stage.name, operators.join(" -> "));
    }
}

pub fn print_run_table(runs: &[RunMetric]) {
    if runs.is_empty() {
        println!("No runs recorded.");
        return;
    }

    println!(
        "{:<40} {:<16} {:>10} {:>10} {:>9} {:>10}",
        "Run", "Pipeline", "Input", "Output", "Pass %", "Errors"
    );
    for run in runs {
        println!(
            "{:<40} {:<16} {:>10} {:>10} {:>9.2} {:>10}",
            run.run_id,
            run.pipeline_name,
            run.total_input_records,
            run.total_output_records,
            run.overall_pass_rate,
            run.total_errors
        );
    }
}

fn print_operator_table(operators: &[OperatorMetric]) {
    println!(
        "{:<18} {:<18} {:>10} {:>10} {:>12} {:>12}",
        "Stage", "Operator", "Input", "Output", "p95 (s)", "rec/s"
    );
    for op in operators {
        println!(
            "{:<18} {:<18} {:>10} {:>10} {:>12.6} {:>12.1}",
            op.stage_name,
            op.operator_name,
            op.input_records,
            op.output_records,
            op.p95_latency,
            op.throughput
        );
    }
}
