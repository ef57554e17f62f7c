use simplelog::ColorChoice;
use simplelog::CombinedLogger;
use simplelog::ConfigBuilder;
use simplelog::LevelFilter;
use simplelog::SharedLogger;
use simplelog::TermLogger;
use simplelog::TerminalMode;
use simplelog::WriteLogger;
use std::path::Path;

/// Output mode for the process-aware messenger.
///
/// Quiet silences everything, Verbose raises the terminal filter to
/// debug level, and MasterOnly silences every rank except rank zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    #[default]
    Normal,
    Quiet,
    Verbose,
    MasterOnly,
}

impl OutputMode {
    /// terminal level filter for this mode on the given rank
    fn filter(&self, rank: usize) -> LevelFilter {
        match self {
            Self::Quiet => LevelFilter::Off,
            Self::Verbose => LevelFilter::Debug,
            Self::Normal => LevelFilter::Info,
            Self::MasterOnly if rank == 0 => LevelFilter::Info,
            Self::MasterOnly => LevelFilter::Off,
        }
    }
}

pub struct Messenger;

impl Messenger {
    /// Initialise logging for this process. When a redirect stem is given
    /// each rank writes to `<stem>.<rank>` instead of the terminal.
    pub fn init(mode: OutputMode, redirect: Option<&Path>, rank: usize) -> anyhow::Result<()> {
        let config = ConfigBuilder::new()
            .set_location_level(LevelFilter::Off)
            .set_target_level(LevelFilter::Off)
            .set_thread_level(LevelFilter::Off)
            .set_time_level(LevelFilter::Off)
            .build();
        let loggers: Vec<Box<dyn SharedLogger>> = match redirect {
            Some(stem) => {
                let path = format!("{}.{}", stem.display(), rank);
                let file = std::fs::File::create(&path)?;
                vec![WriteLogger::new(mode.filter(rank), config, file)]
            }
            None => {
                vec![TermLogger::new(
                    mode.filter(rank),
                    config,
                    TerminalMode::Mixed,
                    ColorChoice::Auto,
                )]
            }
        };
        CombinedLogger::init(loggers)?;
        Ok(())
    }

    /// banner line for a new section of output
    pub fn banner(title: &str) {
        log::info!("{}", "=".repeat(64));
        log::info!("  {}", title);
        log::info!("{}", "=".repeat(64));
    }

    /// log an error and produce it for propagation
    pub fn error(message: &str) -> anyhow::Error {
        log::error!("{}", message);
        anyhow::anyhow!("{}", message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quiet_silences_all_ranks() {
        assert_eq!(OutputMode::Quiet.filter(0), LevelFilter::Off);
        assert_eq!(OutputMode::Quiet.filter(3), LevelFilter::Off);
    }

    #[test]
    fn master_only_gates_on_rank() {
        assert_eq!(OutputMode::MasterOnly.filter(0), LevelFilter::Info);
        assert_eq!(OutputMode::MasterOnly.filter(1), LevelFilter::Off);
    }

    #[test]
    fn verbose_raises_filter() {
        assert_eq!(OutputMode::Verbose.filter(0), LevelFilter::Debug);
    }
}
