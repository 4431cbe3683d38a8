//! Platform matching.

use imgseal_types::{Descriptor, Platform, TypeError};

/// Decides whether a platform satisfies a requested target.
///
/// Both sides are normalized before comparison, so `linux/x86_64` matches
/// `linux/amd64` and `linux/aarch64` matches `linux/arm64/v8`. A requested
/// platform without a variant matches every variant of its architecture.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlatformMatcher {
    target: Option<Platform>,
}

impl PlatformMatcher {
    /// Match platforms equivalent to `target`.
    pub fn new(target: Platform) -> Self {
        let keep_variant = target.variant.is_some() || implies_variant(&target.architecture);
        Self::from_normalized(target.normalize(), keep_variant)
    }

    /// Match every platform.
    pub fn any() -> Self {
        Self { target: None }
    }

    /// Parse an `os/arch[/variant]` target.
    pub fn parse(spec: &str) -> Result<Self, TypeError> {
        let platform = Platform::parse(spec)?;
        let mut parts = spec.split('/');
        let keep_variant =
            parts.nth(1).is_some_and(implies_variant) || parts.next().is_some();
        Ok(Self::from_normalized(platform, keep_variant))
    }

    // Normalization fills in default variants; a target that did not ask for
    // one matches every variant.
    fn from_normalized(mut target: Platform, keep_variant: bool) -> Self {
        if !keep_variant {
            target.variant = None;
        }
        Self {
            target: Some(target),
        }
    }

    /// Returns `true` if `platform` satisfies the target.
    pub fn matches(&self, platform: &Platform) -> bool {
        let Some(target) = &self.target else {
            return true;
        };
        let candidate = platform.clone().normalize();
        target.os == candidate.os
            && target.architecture == candidate.architecture
            && (target.variant.is_none() || target.variant == candidate.variant)
    }

    /// Returns `true` if the descriptor's platform satisfies the target.
    ///
    /// A descriptor without a platform only satisfies [`PlatformMatcher::any`].
    pub fn matches_descriptor(&self, desc: &Descriptor) -> bool {
        match &desc.platform {
            Some(p) => self.matches(p),
            None => self.target.is_none(),
        }
    }
}

fn implies_variant(arch: &str) -> bool {
    matches!(arch.to_ascii_lowercase().as_str(), "armhf" | "armel")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(spec: &str) -> Platform {
        Platform::parse(spec).unwrap()
    }

    #[test]
    fn aliases_match() {
        let m = PlatformMatcher::new(Platform::new("linux", "x86_64"));
        assert!(m.matches(&p("linux/amd64")));
        assert!(m.matches(&Platform::new("Linux", "AMD64")));
        assert!(!m.matches(&p("linux/arm64")));
        assert!(!m.matches(&p("windows/amd64")));
    }

    #[test]
    fn variantless_target_matches_all_variants() {
        let m = PlatformMatcher::parse("linux/arm").unwrap();
        assert!(m.matches(&p("linux/arm/v6")));
        assert!(m.matches(&p("linux/arm/v7")));

        let m = PlatformMatcher::parse("linux/arm64").unwrap();
        assert!(m.matches(&Platform::new("linux", "aarch64")));
        assert!(m.matches(&p("linux/arm64/v8")));
    }

    #[test]
    fn explicit_variant_narrows() {
        let m = PlatformMatcher::parse("linux/arm/v6").unwrap();
        assert!(m.matches(&p("linux/arm/v6")));
        assert!(m.matches(&Platform::new("linux", "armel")));
        assert!(!m.matches(&p("linux/arm/v7")));
    }

    #[test]
    fn any_matches_everything() {
        let m = PlatformMatcher::any();
        assert!(m.matches(&p("linux/s390x")));
        let bare = Descriptor::for_content("application/octet-stream", b"x");
        assert!(m.matches_descriptor(&bare));
        assert!(!PlatformMatcher::parse("linux/amd64").unwrap().matches_descriptor(&bare));
    }

    #[test]
    fn descriptor_platform_is_consulted() {
        let d = Descriptor::for_content("application/octet-stream", b"x")
            .with_platform(p("linux/amd64"));
        assert!(PlatformMatcher::parse("linux/x86_64").unwrap().matches_descriptor(&d));
    }
}
