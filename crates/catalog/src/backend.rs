use std::fmt;

use microq_core::FreqMode;

/// Spectrometer backend a freqmode was observed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    Ac1,
    Ac2,
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ac1 => f.write_str("AC1"),
            Self::Ac2 => f.write_str("AC2"),
        }
    }
}

const FREQMODE_TO_BACKEND: &[(FreqMode, Backend)] = &[
    (1, Backend::Ac2),
    (2, Backend::Ac1),
    (8, Backend::Ac2),
    (13, Backend::Ac1),
    (14, Backend::Ac2),
    (17, Backend::Ac2),
    (19, Backend::Ac1),
    (21, Backend::Ac1),
    (22, Backend::Ac2),
    (23, Backend::Ac1),
    (24, Backend::Ac1),
    (25, Backend::Ac1),
    (29, Backend::Ac1),
    (102, Backend::Ac2),
    (113, Backend::Ac2),
    (119, Backend::Ac2),
    (121, Backend::Ac2),
];

/// Backend used by the vds dataset for `freqmode`.
pub fn backend_for(freqmode: FreqMode) -> Option<Backend> {
    FREQMODE_TO_BACKEND
        .iter()
        .find(|(fm, _)| *fm == freqmode)
        .map(|(_, backend)| *backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_freqmodes() {
        assert_eq!(backend_for(1), Some(Backend::Ac2));
        assert_eq!(backend_for(13), Some(Backend::Ac1));
        assert_eq!(backend_for(121).map(|b| b.to_string()).as_deref(), Some("AC2"));
        assert_eq!(FREQMODE_TO_BACKEND.len(), 17);
    }

    #[test]
    fn test_unknown_freqmode() {
        assert_eq!(backend_for(3), None);
        assert_eq!(backend_for(0), None);
    }
}
