pub mod diagnosis;
pub mod parser;
pub mod scraper;

pub use self::diagnosis::diagnose_page;
pub use self::parser::{parse, parse_schedule, parse_schedule_date, parse_with_layout};
pub use self::scraper::ScheduleScraper;
