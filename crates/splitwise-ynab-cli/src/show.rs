use anstyle::{AnsiColor, Color, Style};
use splitwise_ynab::Direction;
use splitwise_ynab::state::StateStore;
use splitwise_ynab::sync::{RecordOutcome, RunReport, ToBudgetReport, ToSplitwiseReport};
use std::fmt::Write as _;

struct Palette {
    header: Style,
    ok: Style,
    warn: Style,
    error: Style,
}

impl Palette {
    fn colored() -> Self {
        Palette {
            header: Style::new().bold(),
            ok: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Green))),
            warn: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Yellow))),
            error: Style::new().fg_color(Some(Color::Ansi(AnsiColor::Red))),
        }
    }

    #[cfg(test)]
    fn plain() -> Self {
        Palette {
            header: Style::new(),
            ok: Style::new(),
            warn: Style::new(),
            error: Style::new(),
        }
    }
}

pub fn show_report(report: &RunReport) {
    print!("{}", render_report(report, &Palette::colored()));
}

pub fn show_status(store: &StateStore) {
    print!("{}", render_status(store, &Palette::colored()));
}

fn render_report(report: &RunReport, p: &Palette) -> String {
    let mut out = String::new();
    let Palette {
        header,
        ok,
        warn,
        error,
    } = p;

    if let Some(result) = &report.to_splitwise {
        let _ = writeln!(out, "{header}━━━ {} ━━━{header:#}", Direction::YnabToSplitwise);
        match result {
            Ok(ToSplitwiseReport::Skipped(reason)) => {
                let _ = writeln!(out, "  {warn}skipped{warn:#}: {reason}");
            }
            Ok(ToSplitwiseReport::Completed(batch)) => {
                let _ = writeln!(
                    out,
                    "  {} transaction(s) since {}",
                    batch.fetched,
                    batch.window_start.date_naive()
                );
                for record in &batch.records {
                    match &record.outcome {
                        RecordOutcome::Synced {
                            expense_id,
                            flag_cleared: true,
                        } => {
                            let _ = writeln!(
                                out,
                                "  {ok}✓{ok:#} {} → expense {expense_id}",
                                record.transaction_id
                            );
                        }
                        RecordOutcome::Synced {
                            expense_id,
                            flag_cleared: false,
                        } => {
                            let _ = writeln!(
                                out,
                                "  {warn}✓{warn:#} {} → expense {expense_id} (flag not cleared)",
                                record.transaction_id
                            );
                        }
                        RecordOutcome::Failed { error: e } => {
                            let _ = writeln!(
                                out,
                                "  {error}✗{error:#} {}: {e:#}",
                                record.transaction_id
                            );
                        }
                    }
                }
                let synced = batch.synced().count();
                let failed = batch.failed().count();
                let _ = write!(out, "  {ok}{synced}{ok:#} exported");
                if failed > 0 {
                    let _ = write!(out, ", {error}{failed}{error:#} failed");
                }
                let _ = writeln!(out);
            }
            Err(e) => {
                let _ = writeln!(out, "  {error}failed{error:#}: {e:#}");
            }
        }
        out.push('\n');
    }

    if let Some(result) = &report.to_budget {
        let _ = writeln!(out, "{header}━━━ {} ━━━{header:#}", Direction::SplitwiseToYnab);
        match result {
            Ok(ToBudgetReport {
                window_start,
                fetched,
                deleted,
                already_synced,
                invalid,
                created,
            }) => {
                let _ = writeln!(
                    out,
                    "  {fetched} expense(s) updated since {}",
                    window_start.naive_local()
                );
                let _ = write!(out, "  {ok}{created}{ok:#} imported");
                for (count, label) in [
                    (*already_synced, "already synced"),
                    (*deleted, "deleted"),
                ] {
                    if count > 0 {
                        let _ = write!(out, ", {count} {label}");
                    }
                }
                if *invalid > 0 {
                    let _ = write!(out, ", {error}{invalid}{error:#} invalid");
                }
                let _ = writeln!(out);
            }
            Err(e) => {
                let _ = writeln!(out, "  {error}failed{error:#}: {e:#}");
            }
        }
        out.push('\n');
    }

    if report.is_success() {
        let _ = writeln!(out, "{ok}✓ Sync complete{ok:#}");
    } else {
        let _ = writeln!(
            out,
            "{error}✗ Sync failed, the failed direction will be retried next run{error:#}"
        );
    }
    out
}

fn render_status(store: &StateStore, p: &Palette) -> String {
    let mut out = String::new();
    let Palette {
        header, warn, error, ..
    } = p;

    for direction in Direction::ALL {
        let path = store.path(direction);
        let _ = writeln!(out, "{header}━━━ {direction} ━━━{header:#}");
        let _ = writeln!(out, "  state file   {}", path.display());
        match store.snapshot(direction) {
            Ok(Some(file)) => {
                let never = format!("{warn}never{warn:#}");
                let _ = writeln!(
                    out,
                    "  last sync    {}",
                    file.last_sync_date.as_deref().unwrap_or(&never)
                );
                let _ = writeln!(
                    out,
                    "  updated at   {}",
                    file.updated_at.as_deref().unwrap_or("-")
                );
                let _ = writeln!(out, "  synced ids   {}", file.ids(direction).len());
            }
            Ok(None) => {
                let _ = writeln!(out, "  {warn}no sync yet{warn:#}");
            }
            Err(e) => {
                let _ = writeln!(out, "  {error}unreadable{error:#}: {e:#}");
            }
        }
        out.push('\n');
    }
    out
}
