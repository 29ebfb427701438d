use std::io::Write;
use std::time::Duration;

use shared::checker::{CompareOutcome, ComfyDiffChecker, DiffWrite, LatestOutcome};
use shared::dates::SnapshotDate;
use shared::fetcher::FetchOutcome;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{info, warn};

use crate::opener::Opener;

const MENU: &str = "\n=== ComfyDiff Checker ===\n\
1. Compare two specific dates\n\
2. Compare a specific date with the previous day\n\
3. Download the latest file and check differences\n\
4. Delete the latest file\n\
5. Open the diff file\n\
6. Open the snapshot folder\n\
7. Exit";
const SELECT_PROMPT: &str = "Select an option: ";
const INVALID_DATE_MESSAGE: &str = "Invalid date format. Please use YYYY-MM-DD.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuChoice {
    CompareDates,
    CompareWithPrevious,
    DownloadLatest,
    DeleteLatest,
    OpenDiff,
    OpenFolder,
    Exit,
}

impl MenuChoice {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim() {
            "1" => Some(Self::CompareDates),
            "2" => Some(Self::CompareWithPrevious),
            "3" => Some(Self::DownloadLatest),
            "4" => Some(Self::DeleteLatest),
            "5" => Some(Self::OpenDiff),
            "6" => Some(Self::OpenFolder),
            "7" => Some(Self::Exit),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionExit {
    UserExit,
    InputClosed,
    IdleTimeout,
    Interrupted,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("console i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

enum MenuEvent {
    Line(std::io::Result<Option<String>>),
    IdleTimeout,
    Interrupted,
}

enum Flow {
    Continue,
    Exit(SessionExit),
}

enum DateInput {
    Date(SnapshotDate),
    Ended(SessionExit),
}

pub struct Session<'a, R, W> {
    checker: &'a ComfyDiffChecker,
    opener: &'a dyn Opener,
    input: Lines<R>,
    output: W,
    idle_timeout: Duration,
    today: fn() -> SnapshotDate,
    interrupt: watch::Receiver<bool>,
}

impl<'a, R, W> Session<'a, R, W>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    pub fn new(
        checker: &'a ComfyDiffChecker,
        opener: &'a dyn Opener,
        input: R,
        output: W,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            checker,
            opener,
            input: input.lines(),
            output,
            idle_timeout,
            today: SnapshotDate::today,
            interrupt: watch::channel(false).1,
        }
    }

    pub fn with_clock(mut self, today: fn() -> SnapshotDate) -> Self {
        self.today = today;
        self
    }

    /// The session ends with `SessionExit::Interrupted` once the flag turns true,
    /// whether it is waiting at the menu, at a date prompt or inside an operation.
    pub fn with_interrupt(mut self, interrupt: watch::Receiver<bool>) -> Self {
        self.interrupt = interrupt;
        self
    }

    pub async fn run(mut self) -> Result<SessionExit, SessionError> {
        loop {
            writeln!(self.output, "{MENU}")?;
            write!(self.output, "{SELECT_PROMPT}")?;
            self.output.flush()?;

            // A pending line read is cancel-safe, so losing the race to the timeout drops no input.
            let interrupt = interrupted(self.interrupt.clone());
            let event = tokio::select! {
                line = self.input.next_line() => MenuEvent::Line(line),
                () = sleep(self.idle_timeout) => MenuEvent::IdleTimeout,
                () = interrupt => MenuEvent::Interrupted,
            };

            let line = match event {
                MenuEvent::Line(Ok(Some(line))) => line,
                MenuEvent::Line(Ok(None)) => {
                    writeln!(self.output)?;
                    return Ok(SessionExit::InputClosed);
                }
                MenuEvent::Line(Err(err)) => return Err(err.into()),
                MenuEvent::IdleTimeout => {
                    writeln!(self.output)?;
                    writeln!(
                        self.output,
                        "No input for {} seconds, running the automatic refresh.",
                        self.idle_timeout.as_secs()
                    )?;
                    return self.run_auto_action().await;
                }
                MenuEvent::Interrupted => {
                    writeln!(self.output)?;
                    return Ok(SessionExit::Interrupted);
                }
            };

            let Some(choice) = MenuChoice::parse(&line) else {
                writeln!(self.output, "Invalid option.")?;
                continue;
            };

            let interrupt = interrupted(self.interrupt.clone());
            let flow = tokio::select! {
                flow = self.dispatch(choice) => flow?,
                () = interrupt => {
                    writeln!(self.output)?;
                    Flow::Exit(SessionExit::Interrupted)
                }
            };

            if let Flow::Exit(exit) = flow {
                return Ok(exit);
            }
        }
    }

    /// Deletes and redownloads today's snapshot, records its diff against
    /// yesterday's, then opens the diff log.
    pub async fn run_auto_action(mut self) -> Result<SessionExit, SessionError> {
        let today = (self.today)();
        info!(%today, "running auto action");

        let interrupt = interrupted(self.interrupt.clone());
        let outcome = tokio::select! {
            outcome = self.checker.auto_action(today) => outcome,
            () = interrupt => {
                writeln!(self.output)?;
                return Ok(SessionExit::Interrupted);
            }
        };
        if outcome.deleted {
            writeln!(self.output, "Deleted the latest file for {today}.")?;
        }
        self.report_latest(&outcome.latest)?;
        self.open_diff().await?;

        Ok(SessionExit::IdleTimeout)
    }

    async fn dispatch(&mut self, choice: MenuChoice) -> Result<Flow, SessionError> {
        let today = (self.today)();

        match choice {
            MenuChoice::CompareDates => {
                let first = match self
                    .prompt_date("Enter the first date (YYYY-MM-DD): ")
                    .await?
                {
                    DateInput::Date(date) => date,
                    DateInput::Ended(exit) => return Ok(Flow::Exit(exit)),
                };
                let second = match self
                    .prompt_date("Enter the second date (YYYY-MM-DD): ")
                    .await?
                {
                    DateInput::Date(date) => date,
                    DateInput::Ended(exit) => return Ok(Flow::Exit(exit)),
                };

                let outcome = self
                    .checker
                    .compare_dates(first, second, DiffWrite::Write)
                    .await;
                self.report_compare(outcome)?;
            }
            MenuChoice::CompareWithPrevious => {
                let date = match self
                    .prompt_date("Enter the date to compare (YYYY-MM-DD): ")
                    .await?
                {
                    DateInput::Date(date) => date,
                    DateInput::Ended(exit) => return Ok(Flow::Exit(exit)),
                };

                let outcome = self
                    .checker
                    .compare_with_previous(date, DiffWrite::Write)
                    .await;
                self.report_compare(outcome)?;
            }
            MenuChoice::DownloadLatest => {
                let outcome = self.checker.download_latest(today, DiffWrite::Write).await;
                self.report_latest(&outcome)?;
            }
            MenuChoice::DeleteLatest => match self.checker.delete_latest(today) {
                Ok(true) => writeln!(self.output, "Deleted the latest file for {today}.")?,
                Ok(false) => {}
                Err(err) => {
                    warn!("failed to delete latest snapshot: {err}");
                    writeln!(self.output, "Failed to delete the latest file: {err}")?;
                }
            },
            MenuChoice::OpenDiff => self.open_diff().await?,
            MenuChoice::OpenFolder => {
                self.opener.open_folder(self.checker.snapshot_dir()).await;
            }
            MenuChoice::Exit => return Ok(Flow::Exit(SessionExit::UserExit)),
        }

        Ok(Flow::Continue)
    }

    async fn prompt_date(&mut self, prompt: &str) -> Result<DateInput, SessionError> {
        loop {
            write!(self.output, "{prompt}")?;
            self.output.flush()?;

            let interrupt = interrupted(self.interrupt.clone());
            let line = tokio::select! {
                line = self.input.next_line() => line?,
                () = interrupt => {
                    writeln!(self.output)?;
                    return Ok(DateInput::Ended(SessionExit::Interrupted));
                }
            };
            let Some(line) = line else {
                writeln!(self.output)?;
                return Ok(DateInput::Ended(SessionExit::InputClosed));
            };

            match SnapshotDate::parse(&line) {
                Ok(date) => return Ok(DateInput::Date(date)),
                Err(_) => writeln!(self.output, "{INVALID_DATE_MESSAGE}")?,
            }
        }
    }

    async fn open_diff(&mut self) -> Result<(), SessionError> {
        let path = self.checker.diff_log_path();
        if path.is_file() {
            self.opener.open_file(path).await;
        } else {
            writeln!(self.output, "Diff file not found: {}", path.display())?;
        }
        Ok(())
    }

    fn report_compare(&mut self, outcome: CompareOutcome) -> Result<(), SessionError> {
        match outcome {
            CompareOutcome::Compared { changes: 0, .. } => {
                writeln!(self.output, "No differences detected.")?;
            }
            CompareOutcome::Compared {
                changes,
                written: true,
            } => {
                writeln!(
                    self.output,
                    "{changes} difference(s) written to {}",
                    self.checker.diff_log_path().display()
                )?;
            }
            CompareOutcome::Compared {
                changes,
                written: false,
            } => {
                writeln!(
                    self.output,
                    "{changes} difference(s) found, diff file not updated."
                )?;
            }
            CompareOutcome::Unavailable => {
                writeln!(
                    self.output,
                    "No diff available: a snapshot is missing or could not be parsed."
                )?;
            }
        }
        Ok(())
    }

    fn report_latest(&mut self, outcome: &LatestOutcome) -> Result<(), SessionError> {
        match outcome {
            LatestOutcome::Unavailable(_) => {
                writeln!(self.output, "Unable to fetch the latest file.")?;
            }
            LatestOutcome::PreviousMissing { latest, .. } => {
                self.report_saved(latest)?;
                writeln!(
                    self.output,
                    "Previous file not found. Skipping comparison."
                )?;
            }
            LatestOutcome::Compared { latest, comparison } => {
                self.report_saved(latest)?;
                self.report_compare(*comparison)?;
            }
            LatestOutcome::Unreadable { latest, .. } => {
                self.report_saved(latest)?;
                writeln!(
                    self.output,
                    "A snapshot could not be parsed. Recorded an empty comparison."
                )?;
            }
        }
        Ok(())
    }

    fn report_saved(&mut self, latest: &FetchOutcome) -> Result<(), SessionError> {
        if let FetchOutcome::Downloaded { path, .. } = latest {
            writeln!(self.output, "Latest file saved: {}", path.display())?;
        }
        Ok(())
    }
}

// A dropped sender means nobody can raise the flag any more.
async fn interrupted(mut interrupt: watch::Receiver<bool>) {
    if interrupt.wait_for(|raised| *raised).await.is_err() {
        std::future::pending::<()>().await;
    }
}
