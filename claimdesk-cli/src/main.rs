#![deny(missing_docs)]
//! ClaimDesk command-line interface.
//!
//! Audits freight invoices from JSON files, drafts dispute letters and submits
//! batches to a ClaimDesk server.

mod client;

use clap::{Args, Parser, Subcommand, ValueEnum};
use claimdesk_core::{
    AuditRecord, CrmEntity, DisputeLetterContext, Page, SearchQuery, Severity, ShipmentAuditData,
    SortOrder, StdFileSystem, filter_records_by_severity, format_currency, get_carrier_stats,
    render_audit_markdown, render_audit_text, render_dispute_letter, render_json,
    render_letter_from_dir, search, summarize_records, try_audit_records,
};
use client::{ServerArgs, SubmittedBatch};
use serde::Deserialize;
use std::fmt::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

pub(crate) type CliResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

const DEFAULT_COMPANY_NAME: &str = claimdesk_core::letter::DEFAULT_COMPANY_NAME;

#[derive(Parser)]
#[command(name = "claimdesk", version, about = "ClaimDesk CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone)]
struct InputArgs {
    /// JSON files holding shipments (an array, or an object with `shipments`).
    #[arg(required = true)]
    files: Vec<PathBuf>,
    /// Maximum number of files read concurrently.
    #[arg(short = 'j', long, default_value_t = 4)]
    concurrency: usize,
}

#[derive(Args, Clone)]
struct OutputArgs {
    /// Output format for report data.
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,
    /// Write the report to a file instead of stdout.
    #[arg(long = "report-output")]
    report_output: Option<PathBuf>,
}

#[derive(Args, Clone)]
struct SearchArgs {
    /// JSON file holding an array of `{"kind": "case" | "vendor" | "lead", ...}` records.
    file: PathBuf,
    /// Text to look for.
    #[arg(long)]
    text: Option<String>,
    /// Accept near matches within two edits.
    #[arg(long)]
    fuzzy: bool,
    /// Field filter as `name=value`, e.g. `kind=vendor`. Repeatable.
    #[arg(long = "filter", value_parser = parse_filter)]
    filters: Vec<(String, String)>,
    /// Field to sort by.
    #[arg(long)]
    sort_by: Option<String>,
    /// Sort largest first.
    #[arg(long)]
    desc: bool,
    /// 1-based page number.
    #[arg(long)]
    page: Option<usize>,
    /// Items per page.
    #[arg(long)]
    page_size: Option<usize>,
}

impl SearchArgs {
    fn to_query(&self) -> SearchQuery {
        SearchQuery {
            text: self.text.clone(),
            fuzzy: self.fuzzy,
            filters: self.filters.iter().cloned().collect(),
            sort_by: self.sort_by.clone(),
            order: if self.desc {
                SortOrder::Desc
            } else {
                SortOrder::Asc
            },
            page: self.page,
            page_size: self.page_size,
        }
    }
}

#[derive(ValueEnum, Copy, Clone, Debug, Eq, PartialEq)]
enum OutputFormat {
    Text,
    Json,
    Markdown,
}

#[derive(Subcommand)]
enum Commands {
    /// Audit shipments and report discrepancies.
    Audit {
        #[command(flatten)]
        input: InputArgs,
        /// Only report shipments at or above this severity.
        #[arg(long, value_parser = parse_severity)]
        min_severity: Option<Severity>,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Per-carrier overcharge statistics.
    Carriers {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Draft a dispute letter for one audited shipment.
    Letter {
        #[command(flatten)]
        input: InputArgs,
        /// Tracking number of the disputed shipment.
        #[arg(long)]
        tracking_number: String,
        /// Sender name printed in the letter.
        #[arg(long, env = "CLAIMDESK_COMPANY_NAME", default_value = DEFAULT_COMPANY_NAME)]
        company_name: String,
        /// Directory with `<claim_type>.md` or `default.md` letter templates.
        #[arg(long, env = "CLAIMDESK_LETTER_TEMPLATE_DIR")]
        template_dir: Option<PathBuf>,
        /// Write the letter to a file instead of stdout.
        #[arg(long = "report-output")]
        report_output: Option<PathBuf>,
    },
    /// Search exported cases, vendors and leads.
    Search {
        #[command(flatten)]
        args: SearchArgs,
        #[command(flatten)]
        report: OutputArgs,
    },
    /// Submit shipments to a ClaimDesk server for auditing and case creation.
    Submit {
        #[command(flatten)]
        input: InputArgs,
        #[command(flatten)]
        server: ServerArgs,
        #[command(flatten)]
        report: OutputArgs,
    },
}

#[cfg(not(test))]
#[tokio::main]
async fn main() -> CliResult<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Audit {
            input,
            min_severity,
            report,
        } => run_audit(input, min_severity, report).await?,
        Commands::Carriers { input, report } => run_carriers(input, report).await?,
        Commands::Letter {
            input,
            tracking_number,
            company_name,
            template_dir,
            report_output,
        } => {
            let letter =
                run_letter(input, &tracking_number, company_name, template_dir.as_deref())
                    .await?;
            write_output(report_output.as_deref(), letter).await?
        }
        Commands::Search { args, report } => run_search(&args, report).await?,
        Commands::Submit {
            input,
            server,
            report,
        } => {
            let shipments = load_shipments(&input).await?;
            let client = client::ReqwestAuditClient::new()?;
            let batch = client::submit_with(&server, &client, &shipments).await?;
            emit_submitted(&batch, &report).await?
        }
    }

    Ok(())
}

#[cfg(test)]
fn main() {}

fn parse_severity(value: &str) -> Result<Severity, String> {
    Severity::parse(value)
        .ok_or_else(|| format!("unknown severity '{value}' (LOW, MEDIUM, HIGH, CRITICAL)"))
}

fn parse_filter(value: &str) -> Result<(String, String), String> {
    match value.split_once('=') {
        Some((name, expected)) if !name.trim().is_empty() => {
            Ok((name.trim().to_string(), expected.trim().to_string()))
        }
        _ => Err(format!("filter '{value}' must look like name=value")),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ShipmentFile {
    List(Vec<ShipmentAuditData>),
    Batch { shipments: Vec<ShipmentAuditData> },
}

async fn read_shipment_file(path: PathBuf) -> CliResult<Vec<ShipmentAuditData>> {
    let contents = tokio::fs::read_to_string(&path).await?;
    let parsed: ShipmentFile = serde_json::from_str(&contents)
        .map_err(|err| format!("{}: not a shipment file: {err}", path.display()))?;
    Ok(match parsed {
        ShipmentFile::List(shipments) => shipments,
        ShipmentFile::Batch { shipments } => shipments,
    })
}

/// Read every input file, keeping the order the files were given in.
async fn load_shipments(input: &InputArgs) -> CliResult<Vec<ShipmentAuditData>> {
    let concurrency = if input.concurrency == 0 {
        1
    } else {
        input.concurrency
    };
    let semaphore = Arc::new(Semaphore::new(concurrency));
    let mut tasks = JoinSet::new();

    for (index, path) in input.files.iter().cloned().enumerate() {
        let permit = semaphore.clone().acquire_owned().await?;
        tasks.spawn(async move {
            let _permit = permit;
            (index, read_shipment_file(path).await)
        });
    }

    let mut loaded = Vec::with_capacity(input.files.len());
    while let Some(result) = tasks.join_next().await {
        let (index, shipments) = result?;
        loaded.push((index, shipments?));
    }
    loaded.sort_by_key(|(index, _)| *index);
    Ok(loaded
        .into_iter()
        .flat_map(|(_, shipments)| shipments)
        .collect())
}

async fn load_records(input: &InputArgs) -> CliResult<Vec<AuditRecord>> {
    let shipments = load_shipments(input).await?;
    Ok(try_audit_records(&shipments)?)
}

async fn run_audit(
    input: InputArgs,
    min_severity: Option<Severity>,
    report: OutputArgs,
) -> CliResult<()> {
    let records = load_records(&input).await?;
    if records.is_empty() {
        println!("No shipments found to audit.");
        return Ok(());
    }
    let summary = summarize_records(&records);
    let carriers = get_carrier_stats(&records);
    let shown = match min_severity {
        Some(severity) => filter_records_by_severity(&records, severity),
        None => records,
    };

    let contents = match report.format {
        OutputFormat::Text => render_audit_text(&shown, &summary, &carriers),
        OutputFormat::Markdown => render_audit_markdown(&shown, &summary, &carriers),
        OutputFormat::Json => render_json(&serde_json::json!({
            "summary": summary,
            "carriers": carriers,
            "records": shown,
        }))?,
    };
    emit_output(&report, contents).await
}

async fn run_carriers(input: InputArgs, report: OutputArgs) -> CliResult<()> {
    let records = load_records(&input).await?;
    let carriers = get_carrier_stats(&records);
    let contents = match report.format {
        OutputFormat::Json => render_json(&carriers)?,
        OutputFormat::Markdown => {
            let mut output = String::from("| Carrier | Shipments | Overcharged | Rate | Total |\n");
            output.push_str("|---|---|---|---|---|\n");
            for stats in &carriers {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {:.1}% | {} |",
                    stats.carrier,
                    stats.total_shipments,
                    stats.overcharges,
                    stats.overcharge_rate,
                    format_currency(stats.total_overcharged)
                );
            }
            output
        }
        OutputFormat::Text => {
            let mut output = String::new();
            for stats in &carriers {
                let _ = writeln!(
                    output,
                    "{}: {}/{} overcharged ({:.1}%), total {}",
                    stats.carrier,
                    stats.overcharges,
                    stats.total_shipments,
                    stats.overcharge_rate,
                    format_currency(stats.total_overcharged)
                );
            }
            output
        }
    };
    emit_output(&report, contents).await
}

async fn run_letter(
    input: InputArgs,
    tracking_number: &str,
    company_name: String,
    template_dir: Option<&Path>,
) -> CliResult<String> {
    let shipments = load_shipments(&input).await?;
    let records = try_audit_records(&shipments)?;
    let wanted = tracking_number.trim();
    let (shipment, record) = shipments
        .iter()
        .zip(&records)
        .find(|(shipment, _)| shipment.tracking_number == wanted)
        .ok_or_else(|| format!("no shipment with tracking number {wanted}"))?;

    let mut context = DisputeLetterContext::from_audit(record, company_name);
    context.ship_date = Some(shipment.ship_date);
    let letter = match template_dir {
        Some(dir) => render_letter_from_dir(&StdFileSystem::new(), dir, &context)?,
        None => render_dispute_letter(&context),
    };
    Ok(letter)
}

async fn load_entities(path: &Path) -> CliResult<Vec<CrmEntity>> {
    let contents = tokio::fs::read_to_string(path).await?;
    let entities = serde_json::from_str(&contents)
        .map_err(|err| format!("{}: not a CRM export: {err}", path.display()))?;
    Ok(entities)
}

fn render_search(page: &Page<CrmEntity>, format: OutputFormat) -> CliResult<String> {
    let mut output = String::new();
    match format {
        OutputFormat::Json => return Ok(render_json(page)?),
        OutputFormat::Markdown => {
            output.push_str("| Kind | Id | Name |\n|---|---|---|\n");
            for entity in &page.items {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} |",
                    entity.kind(),
                    entity.id(),
                    entity.title()
                );
            }
        }
        OutputFormat::Text => {
            for entity in &page.items {
                let _ = writeln!(
                    output,
                    "[{}] #{} {}",
                    entity.kind(),
                    entity.id(),
                    entity.title()
                );
            }
        }
    }
    let _ = writeln!(
        output,
        "{} match(es), page {} of {}",
        page.total,
        page.page,
        page.total_pages.max(1)
    );
    Ok(output)
}

async fn run_search(args: &SearchArgs, report: OutputArgs) -> CliResult<()> {
    let entities = load_entities(&args.file).await?;
    let page = search(&entities, &args.to_query());
    let contents = render_search(&page, report.format)?;
    emit_output(&report, contents).await
}

fn render_submitted_text(batch: &SubmittedBatch) -> String {
    let mut output = String::new();
    let _ = writeln!(output, "Batch: {}", batch.batch_id);
    let _ = writeln!(
        output,
        "Audited {} shipments, {} overcharged ({})",
        batch.summary.total_shipments,
        batch.summary.overcharge_count,
        format_currency(batch.summary.total_overcharged)
    );
    if batch.created_case_ids.is_empty() {
        let _ = writeln!(output, "Cases opened: none");
    } else {
        let ids: Vec<String> = batch
            .created_case_ids
            .iter()
            .map(|id| format!("#{id}"))
            .collect();
        let _ = writeln!(output, "Cases opened: {}", ids.join(", "));
    }
    for outcome in &batch.workflow_outcomes {
        let _ = writeln!(
            output,
            "  {} {} {:?}{}",
            outcome.trigger_id,
            outcome.action,
            outcome.status,
            outcome
                .detail
                .as_deref()
                .map(|detail| format!(": {detail}"))
                .unwrap_or_default()
        );
    }
    output
}

async fn emit_submitted(batch: &SubmittedBatch, report: &OutputArgs) -> CliResult<()> {
    let contents = match report.format {
        OutputFormat::Json => render_json(&serde_json::json!({
            "batchId": batch.batch_id,
            "summary": batch.summary,
            "createdCaseIds": batch.created_case_ids,
            "workflowOutcomes": batch.workflow_outcomes,
        }))?,
        OutputFormat::Markdown => {
            let carriers = get_carrier_stats(&batch.records);
            render_audit_markdown(&batch.records, &batch.summary, &carriers)
        }
        OutputFormat::Text => render_submitted_text(batch),
    };
    emit_output(report, contents).await
}

async fn emit_output(output: &OutputArgs, contents: String) -> CliResult<()> {
    write_output(output.report_output.as_deref(), contents).await
}

async fn write_output(path: Option<&Path>, contents: String) -> CliResult<()> {
    if let Some(path) = path {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, contents).await?;
    } else {
        print!("{contents}");
    }
    Ok(())
}
