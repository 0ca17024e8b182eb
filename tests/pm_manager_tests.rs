//! Lifecycle tests for the PM request manager against a scripted transport.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::MockTransport;
use pm_watcher::pm::{PmFilterType, PmRequestManager, PmRequestState, PmRequestType};
use pm_watcher::snmp::mib::{
    OID_PM_REQUEST_INFO, OID_PM_REQUEST_NEXT_ID, OID_PM_REQUEST_ROW_STATUS, OID_PM_REQUEST_STATE,
    OID_PM_RESULT_PMP_ENTRY, OID_PM_RESULT_VALUE_ENTRY,
};
use pm_watcher::snmp::SnmpValue;

fn manager_with(transport: Arc<MockTransport>) -> PmRequestManager {
    PmRequestManager::new(transport)
}

#[tokio::test]
async fn test_create_activates_row_and_tracks_request() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(OID_PM_REQUEST_NEXT_ID, vec![SnmpValue::Integer(101)]);
    let manager = manager_with(Arc::clone(&transport));

    let request_id = manager
        .create("Port_Traffic_1", "35|12,35|13", PmRequestType::Current, PmFilterType::Port)
        .await
        .expect("create should succeed");

    assert_eq!(request_id, 101);
    assert_eq!(manager.tracked_count(), 1);

    // One SET carrying all five columns, row status last.
    let sets = transport.sets.lock().unwrap();
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].len(), 5);
    let (oid, value) = sets[0].last().unwrap();
    assert_eq!(oid, &format!("{OID_PM_REQUEST_ROW_STATUS}.101"));
    assert_eq!(value, &SnmpValue::Integer(4));
}

#[tokio::test]
async fn test_failed_create_leaves_no_tracked_request() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(OID_PM_REQUEST_NEXT_ID, vec![SnmpValue::Integer(101)]);
    transport.fail_sets_containing(&format!("{OID_PM_REQUEST_ROW_STATUS}.101"));
    let manager = manager_with(Arc::clone(&transport));

    let result = manager
        .create("Port_Traffic_1", "35|12", PmRequestType::Current, PmFilterType::Port)
        .await;

    assert!(result.is_err());
    assert_eq!(manager.tracked_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_execute_polls_through_to_finished() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(OID_PM_REQUEST_NEXT_ID, vec![SnmpValue::Integer(7)]);
    transport.script_get(
        &format!("{OID_PM_REQUEST_STATE}.7"),
        vec![
            SnmpValue::Integer(2), // pending
            SnmpValue::Integer(3), // started
            SnmpValue::Integer(4), // finished
        ],
    );
    let manager = manager_with(Arc::clone(&transport));

    let request_id = manager
        .create("Port_Traffic_1", "35|12", PmRequestType::Current, PmFilterType::Port)
        .await
        .unwrap();
    assert!(manager.execute(request_id, Duration::from_secs(60), 3).await);

    let tracked = manager.tracked_requests();
    assert_eq!(tracked[0].1.state, PmRequestState::Finished);
    // create SET plus one start SET.
    assert_eq!(transport.set_calls.load(std::sync::atomic::Ordering::SeqCst), 2);
}

#[tokio::test(start_paused = true)]
async fn test_execute_reports_remote_failure_with_info() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(OID_PM_REQUEST_NEXT_ID, vec![SnmpValue::Integer(7)]);
    transport.script_get(
        &format!("{OID_PM_REQUEST_STATE}.7"),
        vec![SnmpValue::Integer(5)], // failed, sticky
    );
    transport.script_get(
        &format!("{OID_PM_REQUEST_INFO}.7"),
        vec![SnmpValue::Text("filter invalid".to_string())],
    );
    let manager = manager_with(Arc::clone(&transport));

    let request_id = manager
        .create("Port_Traffic_1", "35|12", PmRequestType::Current, PmFilterType::Port)
        .await
        .unwrap();
    assert!(!manager.execute(request_id, Duration::from_secs(60), 2).await);

    let tracked = manager.tracked_requests();
    assert_eq!(tracked[0].1.state, PmRequestState::Failed);
    let last_error = tracked[0].1.last_error.clone().unwrap();
    assert!(last_error.contains("filter invalid"), "got: {last_error}");
}

#[tokio::test]
async fn test_results_filter_by_request_id_across_shared_tables() {
    let transport = Arc::new(MockTransport::new());
    transport.script_walk(
        OID_PM_RESULT_PMP_ENTRY,
        vec![
            (format!("{OID_PM_RESULT_PMP_ENTRY}.3.5.1"), SnmpValue::Text("35".into())),
            (format!("{OID_PM_RESULT_PMP_ENTRY}.3.8.1"), SnmpValue::Text("99".into())),
            (format!("{OID_PM_RESULT_PMP_ENTRY}.4.5.1"), SnmpValue::Text("12".into())),
            (format!("{OID_PM_RESULT_PMP_ENTRY}.4.8.1"), SnmpValue::Text("44".into())),
            (format!("{OID_PM_RESULT_PMP_ENTRY}.3.5.2"), SnmpValue::Text("35".into())),
        ],
    );
    transport.script_walk(
        OID_PM_RESULT_VALUE_ENTRY,
        vec![
            (format!("{OID_PM_RESULT_VALUE_ENTRY}.4.5.1.1"), SnmpValue::Text("Bytes In".into())),
            (format!("{OID_PM_RESULT_VALUE_ENTRY}.5.5.1.1"), SnmpValue::Text("1024".into())),
            (format!("{OID_PM_RESULT_VALUE_ENTRY}.4.8.1.1"), SnmpValue::Text("Bytes In".into())),
        ],
    );
    let manager = manager_with(Arc::clone(&transport));

    let (pmps, values) = manager.results(5).await;
    assert_eq!(pmps.len(), 2);
    assert!(pmps.iter().all(|p| p.request_id == 5));
    assert_eq!(pmps[0].ne_id.as_deref(), Some("35"));
    assert_eq!(pmps[0].port_id.as_deref(), Some("12"));
    assert_eq!(values.len(), 1);
    assert_eq!(values[0].param_value.as_deref(), Some("1024"));
}

#[tokio::test]
async fn test_results_degrade_per_table_on_walk_failure() {
    let transport = Arc::new(MockTransport::new());
    // Only the value table answers; the PMP walk times out.
    transport.script_walk(
        OID_PM_RESULT_VALUE_ENTRY,
        vec![(format!("{OID_PM_RESULT_VALUE_ENTRY}.4.5.1.1"), SnmpValue::Text("Bytes In".into()))],
    );
    let manager = manager_with(Arc::clone(&transport));

    let (pmps, values) = manager.results(5).await;
    assert!(pmps.is_empty());
    assert_eq!(values.len(), 1);
}

#[tokio::test]
async fn test_delete_drops_tracking_even_when_destroy_fails() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(OID_PM_REQUEST_NEXT_ID, vec![SnmpValue::Integer(101)]);
    let manager = manager_with(Arc::clone(&transport));

    let request_id = manager
        .create("Port_Traffic_1", "35|12", PmRequestType::Current, PmFilterType::Port)
        .await
        .unwrap();
    transport.fail_sets_containing(&format!("{OID_PM_REQUEST_ROW_STATUS}.{request_id}"));

    assert!(!manager.delete(request_id).await);
    assert_eq!(manager.tracked_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_removes_finished_but_not_fresh_created() {
    let transport = Arc::new(MockTransport::new());
    transport.script_get(
        OID_PM_REQUEST_NEXT_ID,
        vec![SnmpValue::Integer(101), SnmpValue::Integer(102)],
    );
    transport.script_get(
        &format!("{OID_PM_REQUEST_STATE}.101"),
        vec![SnmpValue::Integer(4)],
    );
    let manager = manager_with(Arc::clone(&transport));

    let first = manager
        .create("Port_Traffic_1", "35|12", PmRequestType::Current, PmFilterType::Port)
        .await
        .unwrap();
    assert!(manager.execute(first, Duration::from_secs(60), 1).await);
    manager
        .create("Port_Traffic_2", "35|13", PmRequestType::Current, PmFilterType::Port)
        .await
        .unwrap();
    assert_eq!(manager.tracked_count(), 2);

    // Zero retention: the finished request ages out immediately, the one
    // still in its created state is never eligible.
    let stats = manager
        .cleanup_old_requests(Duration::ZERO, Duration::ZERO)
        .await;
    assert_eq!(stats.old_requests, 1);
    assert_eq!(stats.total_cleaned, 1);
    assert_eq!(stats.cleanup_errors, 0);
    assert_eq!(manager.tracked_count(), 1);
}
