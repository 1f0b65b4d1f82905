// Pipeline phases run for every sample, in this order

/// Processing phase of one sample
///
/// Stages:
/// - **AlignSearch**: workers align their read slice, keep reads with one
///   unmapped mate and search them against the reference
/// - **BuildIndex**: workers index their slice of the unified hit file by read
/// - **FilterUnique**: workers keep hits of reads that hit a single target
/// - **PostProcess**: coordinator sorts the intervals and counts them per window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Phase {
    AlignSearch = 1,
    BuildIndex = 2,
    FilterUnique = 3,
    PostProcess = 4,
}

impl Phase {
    pub const ALL: [Phase; 4] = [
        Phase::AlignSearch,
        Phase::BuildIndex,
        Phase::FilterUnique,
        Phase::PostProcess,
    ];

    #[inline]
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Phase::ALL.into_iter().find(|p| p.code() == code)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::AlignSearch => "align and search",
            Phase::BuildIndex => "read hit index",
            Phase::FilterUnique => "unique-hit filter",
            Phase::PostProcess => "post-processing",
        }
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        for phase in Phase::ALL {
            assert_eq!(Phase::from_code(phase.code()), Some(phase));
        }
        assert_eq!(Phase::from_code(0), None);
        assert_eq!(Phase::from_code(5), None);
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::ALL.windows(2).all(|w| w[0].code() < w[1].code()));
        assert_eq!(Phase::ALL[0], Phase::AlignSearch);
        assert_eq!(Phase::ALL[3], Phase::PostProcess);
    }
}
