use super::*;

#[test]
fn test_capability_error_message() {
    let err = XrError::Capability("no spatial API".to_string());
    assert_eq!(err.to_string(), "Spatial API unavailable: no spatial API");
}

#[test]
fn test_unsupported_mode_message() {
    let err = XrError::UnsupportedMode(SessionMode::ImmersiveAr);
    assert_eq!(err.to_string(), "Session mode not supported: immersive-ar");
}

#[test]
fn test_feature_unavailable_message() {
    let err = XrError::FeatureUnavailable(Feature::HitTest);
    assert_eq!(err.to_string(), "Feature unavailable: hit-test");
}

#[test]
fn test_host_error_conversion() {
    let err: XrError = HostError::Rejected("user denied".to_string()).into();
    assert_eq!(err, XrError::Host(HostError::Rejected("user denied".to_string())));
    assert!(err.to_string().contains("user denied"));
}

#[test]
fn test_fatal_classification() {
    assert!(XrError::SessionRequest("denied".to_string()).is_fatal());
    assert!(XrError::UnsupportedMode(SessionMode::ImmersiveVr).is_fatal());
    assert!(!XrError::FeatureUnavailable(Feature::Anchors).is_fatal());
    assert!(!XrError::NoActiveSession.is_fatal());
}

#[test]
fn test_errors_are_cloneable() {
    let err = XrError::SessionRequest("busy".to_string());
    let copy = err.clone();
    assert_eq!(err, copy);
}
