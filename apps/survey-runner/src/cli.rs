use chrono::NaiveDate;
use clap::Parser;

use pipeline_cell::{date_range, PipelineError};

#[derive(Parser, Debug)]
#[command(name = "survey-runner")]
#[command(about = "Sync the EHR schedule into the appointments table and send post-visit surveys")]
pub struct Cli {
    /// First schedule date to process (YYYY-MM-DD)
    #[arg(long)]
    pub start: Option<NaiveDate>,

    /// Last schedule date to process, inclusive (YYYY-MM-DD); defaults to today
    #[arg(long, requires = "start")]
    pub end: Option<NaiveDate>,

    /// Store appointments without sending surveys
    #[arg(long)]
    pub skip_surveys: bool,

    /// Print the dates that would be processed and exit
    #[arg(long)]
    pub dry_run: bool,
}

impl Cli {
    /// Without `--start` the run covers the configured target date, or today.
    pub fn resolve_dates(
        &self,
        target_date: Option<NaiveDate>,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, PipelineError> {
        match self.start {
            Some(start) => date_range(start, self.end.unwrap_or(today)),
            None => Ok(vec![target_date.unwrap_or(today)]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 1, d).unwrap()
    }

    fn cli(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("survey-runner").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_is_target_date_or_today() {
        assert_eq!(cli(&[]).resolve_dates(None, day(9)).unwrap(), vec![day(9)]);
        assert_eq!(cli(&[]).resolve_dates(Some(day(4)), day(9)).unwrap(), vec![day(4)]);
    }

    #[test]
    fn test_range_flags() {
        let args = cli(&["--start", "2025-01-02", "--end", "2025-01-04", "--skip-surveys"]);
        assert!(args.skip_surveys);
        assert_eq!(args.resolve_dates(Some(day(9)), day(9)).unwrap(), vec![day(2), day(3), day(4)]);
    }

    #[test]
    fn test_open_range_ends_today() {
        let args = cli(&["--start", "2025-01-07"]);
        assert_eq!(args.resolve_dates(None, day(9)).unwrap(), vec![day(7), day(8), day(9)]);
    }

    #[test]
    fn test_reversed_range_is_rejected() {
        let args = cli(&["--start", "2025-01-05", "--end", "2025-01-02"]);
        assert!(args.resolve_dates(None, day(9)).is_err());
    }

    #[test]
    fn test_end_requires_start() {
        assert!(Cli::try_parse_from(["survey-runner", "--end", "2025-01-02"]).is_err());
    }
}
