use std::fmt;

/// Stage a transfer has reached. A failed transfer reports the stage it
/// failed in; nothing is written before `Committing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransferStage {
    ValidatingSender,
    ResolvingSender,
    ValidatingReceiver,
    ResolvingReceiver,
    CheckingFunds,
    Committing,
    Done,
}

impl TransferStage {
    /// True once the store may have been written to.
    pub fn is_past_validation(&self) -> bool {
        *self >= TransferStage::Committing
    }
}

impl fmt::Display for TransferStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferStage::ValidatingSender => "validating sender",
            TransferStage::ResolvingSender => "resolving sender",
            TransferStage::ValidatingReceiver => "validating receiver",
            TransferStage::ResolvingReceiver => "resolving receiver",
            TransferStage::CheckingFunds => "checking funds",
            TransferStage::Committing => "committing",
            TransferStage::Done => "done",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(TransferStage::ValidatingSender < TransferStage::ResolvingSender);
        assert!(TransferStage::ResolvingReceiver < TransferStage::CheckingFunds);
        assert!(TransferStage::Committing < TransferStage::Done);
    }

    #[test]
    fn only_commit_and_done_are_past_validation() {
        assert!(!TransferStage::CheckingFunds.is_past_validation());
        assert!(TransferStage::Committing.is_past_validation());
        assert!(TransferStage::Done.is_past_validation());
    }

    #[test]
    fn display() {
        assert_eq!(TransferStage::CheckingFunds.to_string(), "checking funds");
    }
}
