use crate::Error;

/// Version-dependent field layouts, selected once per decode from the
/// header's declared version string and consulted by the section decoders.
/// All format divergence lives behind this value; adding a future layout is
/// a new variant here, not scattered version checks.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FormatProfile {
    /// Pre-3.x exports: bone flip booleans, slot `additive` flag, IK
    /// bend-direction. No flip timelines, no event timeline records.
    Legacy,
    /// 3.x and later exports: signed-scale booleans folded into the bone
    /// scale, blend-mode slots, bend-positive IK with fixed solver order,
    /// flip timelines rewritten as scale keys.
    Modern,
}

impl FormatProfile {
    /// Selects the profile from the header version string ("major.minor.patch").
    pub fn from_version(value: &str, offset: usize) -> Result<Self, Error> {
        let major = value
            .split('.')
            .next()
            .and_then(|s| s.parse::<u32>().ok())
            .ok_or(Error::UnsupportedVersionFeature {
                feature: "version string",
                version: value.to_string(),
                offset,
            })?;
        if major >= 3 {
            Ok(Self::Modern)
        } else {
            Ok(Self::Legacy)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::FormatProfile;

    #[test]
    fn profile_selection_by_major_version() {
        assert_eq!(
            FormatProfile::from_version("3.1.05", 0).expect("modern"),
            FormatProfile::Modern
        );
        assert_eq!(
            FormatProfile::from_version("2.1.27", 0).expect("legacy"),
            FormatProfile::Legacy
        );
    }

    #[test]
    fn profile_selection_rejects_garbage() {
        assert!(FormatProfile::from_version("", 7).is_err());
        assert!(FormatProfile::from_version("beta", 7).is_err());
    }
}
