use std::fmt;

/// Lifecycle of one page within a run.
///
/// `Pending -> Fetching -> (Fetched | FetchFailed)`, then
/// `Fetched -> Converting -> (Converted | ConvertFailed)`, then
/// `Converted -> Writing -> (Written | WriteFailed)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageStage {
    #[default]
    Pending,
    Fetching,
    Fetched,
    FetchFailed,
    Converting,
    Converted,
    ConvertFailed,
    Writing,
    Written,
    WriteFailed,
}

impl PageStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PageStage::FetchFailed
                | PageStage::ConvertFailed
                | PageStage::Written
                | PageStage::WriteFailed
        )
    }

    pub fn is_failure(self) -> bool {
        matches!(
            self,
            PageStage::FetchFailed | PageStage::ConvertFailed | PageStage::WriteFailed
        )
    }

    pub fn can_advance_to(self, next: PageStage) -> bool {
        use PageStage::*;
        matches!(
            (self, next),
            (Pending, Fetching)
                | (Fetching, Fetched)
                | (Fetching, FetchFailed)
                | (Fetched, Converting)
                | (Converting, Converted)
                | (Converting, ConvertFailed)
                | (Converted, Writing)
                | (Writing, Written)
                | (Writing, WriteFailed)
        )
    }

    pub fn advance(self, next: PageStage) -> Result<PageStage, InvalidTransition> {
        if self.can_advance_to(next) {
            Ok(next)
        } else {
            Err(InvalidTransition {
                from: self,
                to: next,
            })
        }
    }

    fn as_str(self) -> &'static str {
        match self {
            PageStage::Pending => "pending",
            PageStage::Fetching => "fetching",
            PageStage::Fetched => "fetched",
            PageStage::FetchFailed => "fetch_failed",
            PageStage::Converting => "converting",
            PageStage::Converted => "converted",
            PageStage::ConvertFailed => "convert_failed",
            PageStage::Writing => "writing",
            PageStage::Written => "written",
            PageStage::WriteFailed => "write_failed",
        }
    }
}

impl fmt::Display for PageStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: PageStage,
    pub to: PageStage,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid page transition {} -> {}", self.from, self.to)
    }
}

impl std::error::Error for InvalidTransition {}
