use gateway_telemetry::new_request_ids;

#[test]
fn request_ids_non_empty() {
    let ids = new_request_ids();
    assert!(!ids.request_id.is_empty());
    assert!(!ids.trace_id.is_empty());
}

#[test]
fn counters_accumulate() {
    let before = gateway_telemetry::metrics().snapshot();
    gateway_telemetry::record_positions_decoded(3);
    gateway_telemetry::record_frame_malformed();
    let after = gateway_telemetry::metrics().snapshot();
    assert!(after.positions_decoded >= before.positions_decoded + 3);
    assert!(after.frames_malformed > before.frames_malformed);
}
