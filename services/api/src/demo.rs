use crate::infra::{parse_date, InMemoryBackendGateway, RecordedSubmission};
use chrono::{Local, NaiveDate};
use clap::Args;
use class_cancel::error::AppError;
use class_cancel::workflows::cancellation::eligibility::days_between;
use class_cancel::workflows::cancellation::{
    classify_eligibility, CancellationOrchestrator, Clock, FixedClock, FlowFailure,
    OrchestratorSettings, SubmissionReceipt, WorkflowDetails, DEFAULT_CANCEL_REASON,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct EligibilityArgs {
    /// Training type id of the class (1 and 2 use the short cutoff)
    #[arg(long)]
    pub(crate) training_type: String,
    /// Class start date (YYYY-MM-DD)
    #[arg(long, value_parser = parse_date)]
    pub(crate) start_date: NaiveDate,
    /// Evaluation date (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
}

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Date the demo treats as today (defaults to today)
    #[arg(long, value_parser = parse_date)]
    pub(crate) today: Option<NaiveDate>,
    /// Reason code submitted with the on-behalf cancellation
    #[arg(long)]
    pub(crate) reason: Option<String>,
}

pub(crate) fn run_eligibility(args: EligibilityArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let days_left = days_between(today, args.start_date);
    let result = classify_eligibility(args.training_type.trim(), days_left);

    println!(
        "Class starting {} (training type {})",
        args.start_date.format("%d/%m/%Y"),
        args.training_type.trim()
    );
    println!(
        "- {} day(s) left | cutoff {} day(s)",
        result.days_left, result.cutoff_days
    );
    println!(
        "- {} | cancellation {}",
        result.reason.label(),
        if result.cancel_enabled {
            "enabled"
        } else {
            "disabled"
        }
    );
    Ok(())
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let today = args.today.unwrap_or_else(|| Local::now().date_naive());
    let reason = args
        .reason
        .unwrap_or_else(|| DEFAULT_CANCEL_REASON.to_string());

    let clock: Arc<dyn Clock> = Arc::new(FixedClock::new(today));
    let gateway = Arc::new(InMemoryBackendGateway::seeded(Arc::clone(&clock))?);
    let mut flow = CancellationOrchestrator::new(
        Arc::clone(&gateway),
        Arc::clone(&clock),
        OrchestratorSettings::default(),
    );

    println!("Training-class cancellation demo ({})", today.format("%d/%m/%Y"));

    println!("\nSelf-service");
    let start = flow.begin_self_service().await?;
    println!(
        "- Signed in as {} ({})",
        start.profile.display_name, start.identity.employee_id
    );
    let class_ids: Vec<String> = start.classes.iter().map(|c| c.class_id.clone()).collect();
    let mut chosen = None;
    for class_id in &class_ids {
        let details = flow.select_class(class_id).await?;
        render_details(&details);
        if details.eligibility.cancel_enabled && chosen.is_none() {
            chosen = Some(class_id.clone());
        }
    }
    match chosen {
        Some(class_id) => {
            flow.select_class(&class_id).await?;
            render_receipt(flow.confirm("").await);
        }
        None => println!("  No class is inside its cancellation window."),
    }

    println!("\nOn behalf of a subordinate");
    let start = flow.begin_on_behalf().await?;
    println!(
        "- {} direct report(s) for {}",
        start.subordinates.len(),
        start.identity.employee_id
    );
    for subordinate in &start.subordinates {
        let classes = flow
            .select_subordinate(subordinate.employee_id.as_str())
            .await?;
        println!(
            "  {} ({}): {} active class(es)",
            subordinate.display_name,
            subordinate.employee_id,
            classes.len()
        );
        let Some(class) = classes.first() else {
            continue;
        };
        let details = flow.select_class(&class.class_id).await?;
        render_details(&details);
        render_receipt(flow.confirm(&reason).await);
        break;
    }
    flow.dismiss();

    println!("\nSubmissions received by the backend");
    for submission in gateway.submissions() {
        match submission {
            RecordedSubmission::ApprovalRequest {
                workflow_id,
                class_id,
                employee_id,
            } => println!(
                "- approval request {workflow_id}: class {class_id} for employee {employee_id}"
            ),
            RecordedSubmission::Legacy {
                class_id,
                employee_id,
                admin_id,
                user_type,
                reason_code,
            } => println!(
                "- legacy cancel: class {class_id} for employee {employee_id} by {} {admin_id} ({reason_code})",
                user_type.as_str()
            ),
        }
    }

    Ok(())
}

fn render_details(details: &WorkflowDetails) {
    println!(
        "  {} {} | {} - {} | {} day(s) left (cutoff {}) | {}",
        details.record.class_id(),
        details.record.title(),
        details.formatted_start_date,
        details.formatted_end_date,
        details.eligibility.days_left,
        details.eligibility.cutoff_days,
        details.reason_label()
    );
}

fn render_receipt(result: Result<SubmissionReceipt, FlowFailure>) {
    match result {
        Ok(receipt) => println!("  Class cancelled successfully. Backend replied {}", receipt.ack.0),
        Err(failure) => println!("  {}", failure.message()),
    }
}
