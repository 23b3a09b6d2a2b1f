use std::fmt;

/// Affects which media tracks are negotiated if the remote end is not
/// bundle-aware, and what ICE candidates are gathered (RFC 8843).
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum RTCBundlePolicy {
    Unspecified = 0,

    /// Gather ICE candidates for each media type in use (audio, video and
    /// data). If the remote endpoint is not bundle-aware, negotiate only one
    /// audio and video track on separate transports.
    Balanced = 1,

    /// Gather ICE candidates for only one track. If the remote endpoint is
    /// not bundle-aware, negotiate only one media track.
    #[default]
    MaxBundle = 2,

    /// Gather ICE candidates for each track. If the remote endpoint is not
    /// bundle-aware, negotiate all media tracks on separate transports.
    MaxCompat = 3,

    /// Never bundle: one transport per m-line.
    Disable = 4,
}

const BUNDLE_POLICY_BALANCED_STR: &str = "balanced";
const BUNDLE_POLICY_MAX_COMPAT_STR: &str = "max-compat";
const BUNDLE_POLICY_MAX_BUNDLE_STR: &str = "max-bundle";
const BUNDLE_POLICY_DISABLE_STR: &str = "disable";

impl From<&str> for RTCBundlePolicy {
    fn from(raw: &str) -> Self {
        match raw {
            BUNDLE_POLICY_BALANCED_STR => RTCBundlePolicy::Balanced,
            BUNDLE_POLICY_MAX_COMPAT_STR => RTCBundlePolicy::MaxCompat,
            BUNDLE_POLICY_MAX_BUNDLE_STR => RTCBundlePolicy::MaxBundle,
            BUNDLE_POLICY_DISABLE_STR => RTCBundlePolicy::Disable,
            _ => RTCBundlePolicy::Unspecified,
        }
    }
}

impl fmt::Display for RTCBundlePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            RTCBundlePolicy::Balanced => write!(f, "{BUNDLE_POLICY_BALANCED_STR}"),
            RTCBundlePolicy::MaxCompat => write!(f, "{BUNDLE_POLICY_MAX_COMPAT_STR}"),
            RTCBundlePolicy::MaxBundle => write!(f, "{BUNDLE_POLICY_MAX_BUNDLE_STR}"),
            RTCBundlePolicy::Disable => write!(f, "{BUNDLE_POLICY_DISABLE_STR}"),
            _ => write!(f, "{}", super::UNSPECIFIED_STR),
        }
    }
}
