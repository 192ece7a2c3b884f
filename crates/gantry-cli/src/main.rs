use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, anyhow};
use chrono::{Local, Utc};
use clap::{ArgAction, Parser};
use gantry_core::TaskBoard;
use gantry_core::config::{BoardConfig, DEFAULT_PAGE_LIMIT};
use gantry_core::gateway::ServerFilters;
use gantry_core::paging::PageItem;
use gantry_core::task::{Priority, Status, Task};
use gantry_http::{GatewayConfig, HttpGateway};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

#[derive(Parser, Debug)]
#[command(
    name = "gantry",
    version,
    about = "Inspect a task service through the gantry engine"
)]
struct Cli {
    #[arg(long)]
    url: Option<String>,

    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    status: Option<String>,

    #[arg(long)]
    priority: Option<String>,

    #[arg(long)]
    project: Option<String>,

    #[arg(long)]
    assignee: Option<String>,

    #[arg(long)]
    category: Option<String>,

    #[arg(long)]
    search: Option<String>,

    #[arg(long, default_value_t = 1)]
    page: u32,

    #[arg(long)]
    limit: Option<u32>,

    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    verbose: u8,

    #[arg(short = 'q', long = "quiet", action = ArgAction::Count)]
    quiet: u8,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;
    info!(page = cli.page, "starting gantry CLI");

    let mut gateway_cfg =
        GatewayConfig::load(cli.config.as_deref()).context("failed to load gateway config")?;
    gateway_cfg.apply_overrides(cli.url.clone(), None);
    let gateway = HttpGateway::new(gateway_cfg)?;

    let board = TaskBoard::new(
        Arc::new(gateway),
        BoardConfig {
            page_limit: cli.limit.unwrap_or(DEFAULT_PAGE_LIMIT),
        },
    );

    let filters = ServerFilters {
        status: cli.status.as_deref().map(parse_status).transpose()?,
        priority: cli.priority.as_deref().map(parse_priority).transpose()?,
        assignee: cli.assignee.clone(),
        project: cli.project.clone(),
        category: cli.category.clone(),
    };
    board
        .set_filters(filters)
        .await
        .context("failed to fetch tasks")?;
    if cli.page > 1 {
        board
            .goto_page(cli.page)
            .await
            .with_context(|| format!("failed to fetch page {}", cli.page))?;
    }

    if let Some(search) = cli.search.as_deref() {
        debug!(search, "applying client-side search");
        board.set_search(search);
    }

    let tasks = board.visible_tasks();
    print_task_table(&tasks);
    if let Some(line) = render_page_line(&board.page_items(), board.query().page) {
        println!("pages: {line}");
    }
    if let Some(total) = board.total_count() {
        println!("{total} task(s) total");
    }

    Ok(())
}

fn init_tracing(verbose: u8, quiet: u8) -> anyhow::Result<()> {
    let default_level = if quiet >= 2 {
        "error"
    } else if quiet == 1 {
        "warn"
    } else if verbose >= 3 {
        "trace"
    } else if verbose == 2 {
        "debug"
    } else if verbose == 1 {
        "info"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_level))
        .map_err(|e| anyhow!("invalid RUST_LOG / log filter: {e}"))?;

    let init_result = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_level(true)
        .with_ansi(std::io::stderr().is_terminal())
        .with_writer(std::io::stderr)
        .try_init();

    if let Err(err) = init_result {
        debug!(error = %err, "tracing subscriber already set, continuing");
    }

    Ok(())
}

fn parse_status(raw: &str) -> anyhow::Result<Status> {
    match raw.to_ascii_lowercase().as_str() {
        "pending" => Ok(Status::Pending),
        "in-progress" | "in_progress" | "progress" => Ok(Status::InProgress),
        "completed" | "done" => Ok(Status::Completed),
        other => Err(anyhow!("unknown status: {other}")),
    }
}

fn parse_priority(raw: &str) -> anyhow::Result<Priority> {
    match raw.to_ascii_lowercase().as_str() {
        "low" | "l" => Ok(Priority::Low),
        "medium" | "med" | "m" => Ok(Priority::Medium),
        "high" | "h" => Ok(Priority::High),
        other => Err(anyhow!("unknown priority: {other}")),
    }
}

fn print_task_table(tasks: &[Task]) {
    if tasks.is_empty() {
        println!("No tasks match.");
        return;
    }

    let now = Utc::now();
    let headers = ["ID", "Title", "Status", "Pri", "Due", "Assignee", "Tags"];
    let rows: Vec<Vec<String>> = tasks
        .iter()
        .map(|task| {
            let due = task
                .due_date
                .map(|date| date.with_timezone(&Local).format("%Y-%m-%d").to_string())
                .unwrap_or_default();
            let due = if task.is_overdue(now) {
                format!("{due} (overdue)")
            } else {
                due
            };

            vec![
                task.id.clone(),
                truncate(&task.title, 48),
                task.status.as_slug().to_string(),
                task.priority.as_slug().to_string(),
                due,
                task.assignee
                    .as_ref()
                    .map(|person| person.name.clone())
                    .unwrap_or_default(),
                task.tags
                    .iter()
                    .map(|tag| format!("+{tag}"))
                    .collect::<Vec<_>>()
                    .join(" "),
            ]
        })
        .collect();

    let mut widths: Vec<usize> = headers.iter().map(|header| header.width()).collect();
    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(cell.width());
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(idx, header)| pad(header, widths[idx]))
        .collect();
    println!("{}", header_line.join("  ").trim_end());

    for row in &rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(idx, cell)| pad(cell, widths[idx]))
            .collect();
        println!("{}", line.join("  ").trim_end());
    }
}

fn render_page_line(items: &[PageItem], current: u32) -> Option<String> {
    if items.len() <= 1 {
        return None;
    }
    let rendered: Vec<String> = items
        .iter()
        .map(|item| match item {
            PageItem::Page(n) if *n == current => format!("[{n}]"),
            PageItem::Page(n) => n.to_string(),
            PageItem::Ellipsis => "…".to_string(),
        })
        .collect();
    Some(rendered.join(" "))
}

fn pad(text: &str, width: usize) -> String {
    let missing = width.saturating_sub(text.width());
    format!("{text}{}", " ".repeat(missing))
}

fn truncate(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }

    let mut out = String::new();
    let mut used = 0;
    for ch in text.chars() {
        let ch_width = ch.width().unwrap_or(0);
        if used + ch_width > max.saturating_sub(1) {
            break;
        }
        out.push(ch);
        used += ch_width;
    }
    out.push('…');
    out
}
