use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::{json, Value};

use super::*;
use crate::{
    config::LoginConfig,
    drivers::{DriverConfig, DriverError},
    models::ItemBatch,
};

type CallLog = Arc<Mutex<Vec<(String, Method, Value)>>>;

/// Driver double recording every call it receives, tagged with its source
struct RecordingDriver {
    name: String,
    fail_statuses: bool,
    any_source: bool,
    /// Enables the account and request-management operations
    extended: bool,
    log: CallLog,
}

impl RecordingDriver {
    fn record(&self, method: Method, args: Value) {
        self.log
            .lock()
            .unwrap()
            .push((self.name.clone(), method, args));
    }
}

#[async_trait]
impl Driver for RecordingDriver {
    fn set_config(&mut self, config: DriverConfig) {
        self.name = config["name"].as_str().unwrap_or_default().to_string();
        self.fail_statuses = config["fail_statuses"].as_bool().unwrap_or(false);
        self.any_source = config["any_source"].as_bool().unwrap_or(false);
        self.extended = config["extended"].as_bool().unwrap_or(false);
    }

    fn capabilities(&self) -> &'static [Method] {
        &[
            Method::GetStatus,
            Method::GetStatuses,
            Method::GetHolding,
            Method::PatronLogin,
            Method::GetMyProfile,
            Method::GetMyHolds,
            Method::GetMyFines,
            Method::PlaceHold,
            Method::CancelHolds,
            Method::GetCancelHoldDetails,
            Method::GetPickUpLocations,
            Method::CheckRequestIsValid,
            Method::PlaceIllRequest,
            Method::FindReserves,
            Method::GetCourses,
            Method::GetConfig,
            Method::GetMyTransactionHistory,
            Method::GetRequestGroups,
            Method::GetDefaultRequestGroup,
            Method::PlaceStorageRetrievalRequest,
            Method::CancelStorageRetrievalRequests,
            Method::GetCancelStorageRetrievalRequestDetails,
            Method::CancelIllRequests,
            Method::GetCancelIllRequestDetails,
            Method::ChangePassword,
        ]
    }

    fn supports_method(&self, method: Method, _params: &Value) -> Option<bool> {
        match method {
            Method::GetMyTransactionHistory
            | Method::GetRequestGroups
            | Method::GetDefaultRequestGroup
            | Method::PlaceStorageRetrievalRequest
            | Method::CancelStorageRetrievalRequests
            | Method::GetCancelStorageRetrievalRequestDetails
            | Method::CancelIllRequests
            | Method::GetCancelIllRequestDetails
            | Method::ChangePassword => Some(self.extended),
            _ => None,
        }
    }

    fn accepts_any_source(&self) -> bool {
        self.any_source
    }

    async fn get_status(&self, id: &str) -> DriverResult<Vec<Holding>> {
        self.record(Method::GetStatus, json!(id));
        Ok(vec![Holding {
            id: id.to_string(),
            item_id: Some(format!("{}-1", id)),
            availability: true,
            ..Default::default()
        }])
    }

    async fn get_statuses(&self, ids: &[String]) -> DriverResult<Vec<Vec<Holding>>> {
        self.record(Method::GetStatuses, json!(ids));
        if self.fail_statuses {
            return Err(DriverError::Backend("timeout".to_string()));
        }
        Ok(ids
            .iter()
            .map(|id| {
                vec![Holding {
                    id: id.clone(),
                    availability: true,
                    ..Default::default()
                }]
            })
            .collect())
    }

    async fn get_holding(
        &self,
        id: &str,
        patron: Option<&Patron>,
        _options: &Value,
    ) -> DriverResult<Vec<Holding>> {
        self.record(Method::GetHolding, json!({ "id": id, "patron": patron }));
        Ok(vec![Holding {
            id: id.to_string(),
            ..Default::default()
        }])
    }

    async fn patron_login(&self, username: &str, password: &str) -> DriverResult<Option<Patron>> {
        self.record(Method::PatronLogin, json!([username, password]));
        if password != "secret" {
            return Ok(None);
        }
        Ok(Some(Patron::new("1", username)))
    }

    async fn get_my_profile(&self, patron: &Patron) -> DriverResult<Value> {
        self.record(Method::GetMyProfile, json!(patron));
        Ok(json!({ "id": patron.id, "firstname": "Jane" }))
    }

    async fn get_my_holds(&self, patron: &Patron) -> DriverResult<Vec<Value>> {
        self.record(Method::GetMyHolds, json!(patron));
        Ok(vec![json!({ "id": "42", "item_id": "42-1", "reqnum": "7" })])
    }

    async fn get_my_fines(&self, patron: &Patron) -> DriverResult<Vec<Value>> {
        self.record(Method::GetMyFines, json!(patron));
        Ok(vec![json!({ "id": "42", "item_id": "42-1", "amount": 100 })])
    }

    async fn place_hold(&self, details: &RequestDetails) -> DriverResult<ActionResult> {
        self.record(Method::PlaceHold, json!(details));
        Ok(ActionResult::success())
    }

    async fn cancel_holds(&self, details: &CancelDetails) -> DriverResult<Value> {
        self.record(Method::CancelHolds, json!(details));
        Ok(json!({ "count": details.details.len() }))
    }

    async fn get_cancel_hold_details(
        &self,
        hold: &Value,
        patron: Option<&Patron>,
    ) -> DriverResult<String> {
        self.record(Method::GetCancelHoldDetails, json!({ "hold": hold, "patron": patron }));
        Ok(hold["item_id"].as_str().unwrap_or_default().to_string())
    }

    async fn get_pick_up_locations(
        &self,
        patron: Option<&Patron>,
        hold_details: Option<&Value>,
    ) -> DriverResult<Vec<Value>> {
        self.record(
            Method::GetPickUpLocations,
            json!({ "patron": patron, "hold": hold_details }),
        );
        Ok(vec![json!({ "locationID": "main", "id": "loc1" })])
    }

    async fn check_request_is_valid(
        &self,
        id: &str,
        _data: &Value,
        patron: &Patron,
    ) -> DriverResult<RequestValidity> {
        self.record(Method::CheckRequestIsValid, json!({ "id": id, "patron": patron }));
        Ok(RequestValidity::valid())
    }

    async fn place_ill_request(&self, details: &RequestDetails) -> DriverResult<ActionResult> {
        self.record(Method::PlaceIllRequest, json!(details));
        Ok(ActionResult::success())
    }

    async fn get_my_transaction_history(
        &self,
        patron: &Patron,
        params: &Value,
    ) -> DriverResult<Value> {
        self.record(
            Method::GetMyTransactionHistory,
            json!({ "patron": patron, "params": params }),
        );
        Ok(json!({ "count": 1, "transactions": [{ "id": "9", "item_id": "9-1" }] }))
    }

    async fn get_request_groups(
        &self,
        id: &str,
        patron: &Patron,
        hold_details: Option<&Value>,
    ) -> DriverResult<Vec<Value>> {
        self.record(
            Method::GetRequestGroups,
            json!({ "id": id, "patron": patron, "hold": hold_details }),
        );
        Ok(vec![json!({ "id": "g1", "name": "Group" })])
    }

    async fn get_default_request_group(
        &self,
        patron: &Patron,
        hold_details: Option<&Value>,
    ) -> DriverResult<Option<String>> {
        self.record(
            Method::GetDefaultRequestGroup,
            json!({ "patron": patron, "hold": hold_details }),
        );
        Ok(Some("g1".to_string()))
    }

    async fn place_storage_retrieval_request(
        &self,
        details: &RequestDetails,
    ) -> DriverResult<ActionResult> {
        self.record(Method::PlaceStorageRetrievalRequest, json!(details));
        Ok(ActionResult::success())
    }

    async fn cancel_storage_retrieval_requests(&self, details: &CancelDetails) -> DriverResult<Value> {
        self.record(Method::CancelStorageRetrievalRequests, json!(details));
        Ok(json!({ "count": details.details.len() }))
    }

    async fn get_cancel_storage_retrieval_request_details(
        &self,
        details: &Value,
        patron: &Patron,
    ) -> DriverResult<String> {
        self.record(
            Method::GetCancelStorageRetrievalRequestDetails,
            json!({ "details": details, "patron": patron }),
        );
        Ok("srr1".to_string())
    }

    async fn cancel_ill_requests(&self, details: &CancelDetails) -> DriverResult<Value> {
        self.record(Method::CancelIllRequests, json!(details));
        Ok(json!({ "count": details.details.len() }))
    }

    async fn get_cancel_ill_request_details(
        &self,
        details: &Value,
        patron: &Patron,
    ) -> DriverResult<String> {
        self.record(
            Method::GetCancelIllRequestDetails,
            json!({ "details": details, "patron": patron }),
        );
        Ok("ill1".to_string())
    }

    async fn change_password(&self, details: &PasswordChange) -> DriverResult<ActionResult> {
        self.record(Method::ChangePassword, json!(details.patron));
        Ok(ActionResult::success())
    }

    async fn get_courses(&self) -> DriverResult<IndexMap<String, String>> {
        self.record(Method::GetCourses, Value::Null);
        Ok(IndexMap::from([("c1".to_string(), "Course".to_string())]))
    }

    async fn find_reserves(
        &self,
        course: &str,
        _instructor: &str,
        _department: &str,
    ) -> DriverResult<Vec<Value>> {
        self.record(Method::FindReserves, json!(course));
        Ok(vec![json!({ "BIB_ID": "9", "id": "9" })])
    }

    async fn get_config(&self, function: &str, params: &Value) -> DriverResult<Option<Value>> {
        self.record(Method::GetConfig, json!({ "function": function, "params": params }));
        Ok(Some(json!({ "source": self.name })))
    }
}

struct Harness {
    log: CallLog,
    constructed: Arc<AtomicUsize>,
    config: Arc<MultiBackendConfig>,
    manager: Arc<DriverManager>,
    loader: Arc<dyn ConfigLoader>,
}

impl Harness {
    /// `libA` and `libB` are recording drivers, `libC` is registered
    /// without any configuration
    fn new(default: Option<&str>) -> Self {
        let log: CallLog = Arc::default();
        let constructed = Arc::new(AtomicUsize::new(0));

        let mut manager = DriverManager::new();
        let (driver_log, counter) = (log.clone(), constructed.clone());
        manager.register("Recording", move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::new(RecordingDriver {
                name: String::new(),
                fail_statuses: false,
                any_source: false,
                extended: false,
                log: driver_log.clone(),
            })
        });

        let config = MultiBackendConfig {
            default_driver: default.map(str::to_string),
            drivers: IndexMap::from([
                ("libA".to_string(), "Recording".to_string()),
                ("libB".to_string(), "Recording".to_string()),
                ("libC".to_string(), "Recording".to_string()),
            ]),
            login: LoginConfig {
                drivers: vec!["libA".to_string(), "libB".to_string()],
                default_driver: None,
            },
            ..Default::default()
        };

        let loader = StaticConfigLoader::new()
            .with("libA", json!({ "name": "libA" }))
            .with("libB", json!({ "name": "libB", "fail_statuses": true }));

        Self {
            log,
            constructed,
            config: Arc::new(config),
            manager: Arc::new(manager),
            loader: Arc::new(loader),
        }
    }

    /// `libA` and `libB` both offer the account and request-management
    /// operations
    fn extended(default: Option<&str>) -> Self {
        Self::new(default).with_loader(
            StaticConfigLoader::new()
                .with("libA", json!({ "name": "libA", "extended": true }))
                .with("libB", json!({ "name": "libB", "extended": true })),
        )
    }

    fn with_loader(mut self, loader: StaticConfigLoader) -> Self {
        self.loader = Arc::new(loader);
        self
    }

    fn router(&self) -> MultiBackend {
        MultiBackend::new(self.config.clone(), self.manager.clone(), self.loader.clone())
    }

    fn calls(&self) -> Vec<(String, Method, Value)> {
        self.log.lock().unwrap().clone()
    }

    fn calls_to(&self, method: Method) -> Vec<(String, Value)> {
        self.calls()
            .into_iter()
            .filter(|(_, m, _)| *m == method)
            .map(|(source, _, args)| (source, args))
            .collect()
    }
}

#[tokio::test]
async fn test_status_is_prefixed_with_its_source() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let status = router.get_status(&"libA.123".into()).await.unwrap();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].id, "libA.123");
    // item_id is outside the default field set
    assert_eq!(status[0].item_id.as_deref(), Some("123-1"));
    assert_eq!(harness.calls_to(Method::GetStatus), vec![("libA".to_string(), json!("123"))]);
}

#[tokio::test]
async fn test_status_of_unavailable_source_is_empty() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    assert!(router.get_status(&"libC.1".into()).await.unwrap().is_empty());
    assert!(router.get_status(&"nowhere.1".into()).await.unwrap().is_empty());
    assert!(router.get_status(&"123".into()).await.unwrap().is_empty());
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn test_unscoped_status_uses_default_source() {
    let harness = Harness::new(Some("libA"));
    let mut router = harness.router();

    let status = router.get_status(&"123".into()).await.unwrap();
    assert_eq!(status[0].id, "123");
    assert_eq!(harness.calls_to(Method::GetStatus), vec![("libA".to_string(), json!("123"))]);
}

#[tokio::test]
async fn test_status_fan_out_partial_failure() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let ids: Vec<ScopedId> = vec!["libA.1".into(), "libB.2".into(), "libA.3".into()];
    let statuses = router.get_statuses(&ids).await.unwrap();

    assert_eq!(statuses.len(), 3);
    // Groups come back in discovery order: libA first, then libB
    assert_eq!(statuses[0][0].id, "libA.1");
    assert!(!statuses[0][0].is_error());
    assert_eq!(statuses[1][0].id, "libA.3");
    assert_eq!(statuses[2][0].id, "libB.2");
    assert_eq!(statuses[2][0].error.as_deref(), Some(STATUS_ERROR_MESSAGE));

    let batches = harness.calls_to(Method::GetStatuses);
    assert_eq!(
        batches,
        vec![
            ("libA".to_string(), json!(["1", "3"])),
            ("libB".to_string(), json!(["2"])),
        ]
    );
}

#[tokio::test]
async fn test_status_fan_out_skips_sources_without_driver() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let ids: Vec<ScopedId> = vec!["libC.1".into(), "libA.2".into()];
    let statuses = router.get_statuses(&ids).await.unwrap();
    assert_eq!(statuses.len(), 1);
    assert_eq!(statuses[0][0].id, "libA.2");
}

#[tokio::test]
async fn test_status_fan_out_survives_init_failure() {
    let mut manager = DriverManager::with_builtin();
    let log: CallLog = Arc::default();
    let driver_log = log.clone();
    manager.register("Recording", move || {
        Box::new(RecordingDriver {
            name: String::new(),
            fail_statuses: false,
            any_source: false,
            extended: false,
            log: driver_log.clone(),
        })
    });
    let config = MultiBackendConfig {
        drivers: IndexMap::from([
            ("libA".to_string(), "Recording".to_string()),
            ("demo".to_string(), "Demo".to_string()),
        ]),
        ..Default::default()
    };
    let loader = StaticConfigLoader::new()
        .with("libA", json!({ "name": "libA" }))
        .with("demo", json!({ "items_per_record": 0 }));
    let mut router = MultiBackend::new(Arc::new(config), Arc::new(manager), Arc::new(loader));

    let ids: Vec<ScopedId> = vec!["demo.1".into(), "libA.2".into()];
    let statuses = router.get_statuses(&ids).await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert_eq!(statuses[0][0].id, "demo.1");
    assert!(statuses[0][0].is_error());
    assert_eq!(statuses[1][0].id, "libA.2");
    assert!(!statuses[1][0].is_error());
}

#[tokio::test]
async fn test_cross_source_hold_is_rejected_without_driver_call() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let details = RequestDetails::new("libB.42", Patron::new("libA.1", "libA.p1"));
    let result = router.place_hold(&details).await.unwrap();

    assert!(!result.success);
    assert_eq!(result.sys_message.as_deref(), Some("hold_wrong_user_institution"));
    assert!(harness.calls_to(Method::PlaceHold).is_empty());
}

#[tokio::test]
async fn test_place_hold_strips_prefixes() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let mut details = RequestDetails::new("libA.42", Patron::new("libA.1", "libA.p1"));
    details.extra.insert("pickUpLocation".to_string(), json!("main"));
    let result = router.place_hold(&details).await.unwrap();
    assert!(result.success);

    let calls = harness.calls_to(Method::PlaceHold);
    assert_eq!(calls.len(), 1);
    let (source, args) = &calls[0];
    assert_eq!(source, "libA");
    assert_eq!(args["id"], "42");
    assert_eq!(args["patron"]["cat_username"], "p1");
    assert_eq!(args["patron"]["id"], "1");
    assert_eq!(args["pickUpLocation"], "main");
}

#[tokio::test]
async fn test_place_hold_without_driver_fails() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let details = RequestDetails::new("libC.42", Patron::new("libC.1", "libC.p1"));
    let err = router.place_hold(&details).await.unwrap_err();
    assert!(matches!(err, AppError::NoSuitableBackend));
}

#[tokio::test]
async fn test_any_source_driver_accepts_foreign_records() {
    let harness = Harness::new(None).with_loader(
        StaticConfigLoader::new().with("libA", json!({ "name": "libA", "any_source": true })),
    );
    let mut router = harness.router();

    let details = RequestDetails::new("libB.42", Patron::new("libA.1", "libA.p1"));
    assert!(router.place_hold(&details).await.unwrap().success);
    let calls = harness.calls_to(Method::PlaceHold);
    // The foreign record id keeps its prefix
    assert_eq!(calls[0].1["id"], "libB.42");
}

#[tokio::test]
async fn test_unprefixed_login_uses_default_login_source() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let patron = router.patron_login("p1", "secret").await.unwrap().unwrap();
    assert_eq!(patron.cat_username, "libA.p1");
    assert_eq!(patron.id, "libA.1");
    assert_eq!(
        harness.calls_to(Method::PatronLogin),
        vec![("libA".to_string(), json!(["p1", "secret"]))]
    );
}

#[tokio::test]
async fn test_prefixed_login_goes_to_its_source() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let patron = router.patron_login("libB.p2", "secret").await.unwrap().unwrap();
    assert_eq!(patron.cat_username, "libB.p2");
    assert!(router.patron_login("libB.p2", "wrong").await.unwrap().is_none());

    let err = router.patron_login("libC.p3", "secret").await.unwrap_err();
    assert!(matches!(err, AppError::NoSuitableBackend));
}

#[tokio::test]
async fn test_cancel_hold_details_reach_driver_stripped() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let hold = json!({ "item_id": "libA.99", "cat_username": "libA.p1" });
    let reference = router.get_cancel_hold_details(&hold, None).await.unwrap();
    assert_eq!(reference, "99");

    let calls = harness.calls_to(Method::GetCancelHoldDetails);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "libA");
    assert_eq!(calls[0].1["hold"], json!({ "item_id": "99", "cat_username": "p1" }));
}

#[tokio::test]
async fn test_patron_reads_are_prefixed() {
    let harness = Harness::new(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let holds = router.get_my_holds(&patron).await.unwrap();
    assert_eq!(holds, vec![json!({ "id": "libA.42", "item_id": "libA.42-1", "reqnum": "7" })]);

    let fines = router.get_my_fines(&patron).await.unwrap();
    assert_eq!(fines, vec![json!({ "id": "libA.42", "item_id": "42-1", "amount": 100 })]);

    let profile = router.get_my_profile(&patron).await.unwrap();
    assert_eq!(profile["id"], "libA.1");

    let (_, args) = &harness.calls_to(Method::GetMyHolds)[0];
    assert_eq!(args["cat_username"], "p1");
}

#[tokio::test]
async fn test_patron_reads_degrade_to_empty() {
    let harness = Harness::new(None);
    let mut router = harness.router();
    let unknown = Patron::new("libC.1", "libC.p1");

    assert!(router.get_my_holds(&unknown).await.unwrap().is_empty());
    assert_eq!(router.get_my_profile(&unknown).await.unwrap(), json!({}));

    // Supported by nobody
    let patron = Patron::new("libA.1", "libA.p1");
    assert!(router.get_my_transactions(&patron).await.unwrap().is_empty());
    assert!(router.get_request_blocks(&patron).await.unwrap().is_empty());
    assert!(router
        .get_my_storage_retrieval_requests(&patron)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_unsupported_write_fails() {
    let harness = Harness::new(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let renew = ItemBatch::new(patron.clone(), vec!["1".to_string()]);
    assert!(matches!(
        router.renew_my_items(&renew).await.unwrap_err(),
        AppError::NoSuitableBackend
    ));

    let change = PasswordChange {
        patron,
        old_password: "a".to_string(),
        new_password: "b".to_string(),
    };
    assert!(matches!(
        router.change_password(&change).await.unwrap_err(),
        AppError::NoSuitableBackend
    ));
}

#[tokio::test]
async fn test_cancel_holds_strips_patron() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let details = ItemBatch::new(Patron::new("libA.1", "libA.p1"), vec!["7".to_string()]);
    let result = router.cancel_holds(&details).await.unwrap();
    assert_eq!(result["count"], 1);
    let (_, args) = &harness.calls_to(Method::CancelHolds)[0];
    assert_eq!(args["patron"]["cat_username"], "p1");
}

#[tokio::test]
async fn test_holding_drops_foreign_patron() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let own = Patron::new("libA.1", "libA.p1");
    let foreign = Patron::new("libB.1", "libB.p1");
    let holdings = router
        .get_holding(&"libA.5".into(), Some(&own), &Value::Null)
        .await
        .unwrap();
    assert_eq!(holdings[0].id, "libA.5");
    router
        .get_holding(&"libA.5".into(), Some(&foreign), &Value::Null)
        .await
        .unwrap();

    let calls = harness.calls_to(Method::GetHolding);
    assert_eq!(calls[0].1["patron"]["cat_username"], "p1");
    assert_eq!(calls[1].1["patron"], Value::Null);
}

#[tokio::test]
async fn test_pick_up_locations() {
    let harness = Harness::new(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let hold = json!({ "id": "libA.42", "item_id": "libA.42-1" });
    let locations = router
        .get_pick_up_locations(Some(&patron), Some(&hold))
        .await
        .unwrap();
    assert_eq!(locations, vec![json!({ "locationID": "main", "id": "libA.loc1" })]);
    let (_, args) = &harness.calls_to(Method::GetPickUpLocations)[0];
    assert_eq!(args["hold"], json!({ "id": "42", "item_id": "42-1" }));

    let foreign = json!({ "id": "libB.42" });
    assert!(router
        .get_pick_up_locations(Some(&patron), Some(&foreign))
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_request_validity() {
    let harness = Harness::new(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let valid = router
        .check_request_is_valid("libA.42", &json!({}), &patron)
        .await
        .unwrap();
    assert!(valid.valid);

    let foreign = router
        .check_request_is_valid("libB.42", &json!({}), &patron)
        .await
        .unwrap();
    assert!(!foreign.valid);

    let anonymous = router
        .check_request_is_valid("libA.42", &json!({}), &Patron::default())
        .await
        .unwrap();
    assert!(!anonymous.valid);

    // Storage retrieval is not declared by the driver
    let storage = router
        .check_storage_retrieval_request_is_valid("libA.42", &json!({}), &patron)
        .await
        .unwrap();
    assert!(!storage.valid);
    assert_eq!(harness.calls_to(Method::CheckRequestIsValid).len(), 1);
}

#[tokio::test]
async fn test_ill_request_keeps_patron_prefix() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let details = RequestDetails::new("libA.42", Patron::new("libB.1", "libB.p1"));
    assert!(router.place_ill_request(&details).await.unwrap().success);

    let (source, args) = &harness.calls_to(Method::PlaceIllRequest)[0];
    assert_eq!(source, "libA");
    assert_eq!(args["id"], "42");
    assert_eq!(args["patron"]["cat_username"], "libB.p1");
}

#[tokio::test]
async fn test_reserves_use_default_source() {
    let harness = Harness::new(Some("libA"));
    let mut router = harness.router();

    let courses = router.get_courses().await.unwrap();
    assert_eq!(courses.get("c1").map(String::as_str), Some("Course"));
    let reserves = router.find_reserves("c1", "", "").await.unwrap();
    assert_eq!(reserves, vec![json!({ "BIB_ID": "libA.9", "id": "9" })]);

    let without_default = Harness::new(None);
    let mut router = without_default.router();
    assert!(router.get_courses().await.unwrap().is_empty());
    assert!(router.find_reserves("c1", "", "").await.unwrap().is_empty());
}

#[tokio::test]
async fn test_config_query_source_resolution() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    let config = router
        .get_config("Holds", &json!({ "id": "libB.1" }))
        .await
        .unwrap();
    assert_eq!(config, Some(json!({ "source": "libB" })));
    let (_, args) = &harness.calls_to(Method::GetConfig)[0];
    assert_eq!(args["params"], json!({ "id": "1" }));

    // Nothing in the parameters, so the logged-in patron decides
    let mut router = harness
        .router()
        .with_stored_patron(Some(Patron::new("libA.1", "libA.p1")));
    let config = router.get_config("Holds", &json!({})).await.unwrap();
    assert_eq!(config, Some(json!({ "source": "libA" })));

    // Neither parameters nor a patron
    let mut router = harness.router();
    assert_eq!(router.get_config("Holds", &Value::Null).await.unwrap(), None);
}

#[tokio::test]
async fn test_source_from_params() {
    let harness = Harness::new(None);
    let router = harness.router();

    assert_eq!(router.source_from_params(&json!(["libB.1"]), SOURCE_PARAM_KEYS), "libB");
    assert_eq!(
        router.source_from_params(&json!({ "patron": { "cat_username": "libA.p1" } }), SOURCE_PARAM_KEYS),
        "libA"
    );
    assert_eq!(
        router.source_from_params(&json!([{ "cat_username": "libB.p" }]), SOURCE_PARAM_KEYS),
        "libB"
    );
    // Unregistered sources and non-identifier keys are ignored
    assert_eq!(router.source_from_params(&json!(["nowhere.1"]), SOURCE_PARAM_KEYS), "");
    assert_eq!(router.source_from_params(&json!({ "title": "libA.x" }), SOURCE_PARAM_KEYS), "");
    // Only the first position is an identifier
    assert_eq!(router.source_from_params(&json!(["x", "libA.1"]), SOURCE_PARAM_KEYS), "");
}

#[tokio::test]
async fn test_supports_method() {
    let harness = Harness::new(None);
    let mut router = harness.router();

    assert!(router.supports_method(Method::GetLoginDrivers, &Value::Null).await.unwrap());
    assert!(router
        .supports_method(Method::GetMyHolds, &json!([{ "cat_username": "libA.p1" }]))
        .await
        .unwrap());
    assert!(!router
        .supports_method(Method::GetMyTransactions, &json!([{ "cat_username": "libA.p1" }]))
        .await
        .unwrap());
    // Source unknown and no default
    assert!(router.supports_method(Method::GetMyHolds, &Value::Null).await.unwrap());
    assert!(!router.supports_method(Method::GetCourses, &Value::Null).await.unwrap());

    let with_default = Harness::new(Some("libA"));
    let mut router = with_default.router();
    assert!(router.supports_method(Method::GetCourses, &Value::Null).await.unwrap());
}

#[tokio::test]
async fn test_driver_built_once_per_router() {
    let harness = Harness::new(Some("libA"));
    let mut router = harness.router();

    router.get_status(&"libA.1".into()).await.unwrap();
    router.get_status(&"2".into()).await.unwrap();
    router.get_my_holds(&Patron::new("libA.1", "libA.p1")).await.unwrap();
    assert_eq!(harness.constructed.load(Ordering::SeqCst), 1);

    // A new router starts with an empty cache
    let mut other = harness.router();
    other.get_status(&"libA.1".into()).await.unwrap();
    assert_eq!(harness.constructed.load(Ordering::SeqCst), 2);
}

#[test]
fn test_login_sources() {
    let harness = Harness::new(None);
    let router = harness.router();
    assert_eq!(router.get_login_drivers(), vec!["libA", "libB"]);
    assert_eq!(router.get_default_login_driver(), "libA");
}

#[tokio::test]
async fn test_cancel_storage_retrieval_details_follow_patron() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    // A record id of another library does not move the call there
    let reference = router
        .get_cancel_storage_retrieval_request_details(&json!({ "id": "libB.9" }), &patron)
        .await
        .unwrap();
    assert_eq!(reference, "srr1");
    // Details without any record id still reach the patron's library
    router
        .get_cancel_storage_retrieval_request_details(&json!({ "reqnum": "5" }), &patron)
        .await
        .unwrap();
    router
        .get_cancel_storage_retrieval_request_details(&json!({ "id": "libA.9" }), &patron)
        .await
        .unwrap();

    let calls = harness.calls_to(Method::GetCancelStorageRetrievalRequestDetails);
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(source, args)| {
        source == "libA" && args["patron"]["cat_username"] == "p1"
    }));
    assert_eq!(calls[0].1["details"], json!({ "id": "libB.9" }));
    assert_eq!(calls[1].1["details"], json!({ "reqnum": "5" }));
    assert_eq!(calls[2].1["details"], json!({ "id": "9" }));
}

#[tokio::test]
async fn test_cancel_ill_details_follow_patron() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let reference = router
        .get_cancel_ill_request_details(&json!({ "ill_request_id": "5" }), &patron)
        .await
        .unwrap();
    assert_eq!(reference, "ill1");
    router
        .get_cancel_ill_request_details(
            &json!({ "id": "libA.9", "item_id": "libA.9-1" }),
            &patron,
        )
        .await
        .unwrap();
    router
        .get_cancel_ill_request_details(&json!({ "id": "libB.9" }), &patron)
        .await
        .unwrap();

    let calls = harness.calls_to(Method::GetCancelIllRequestDetails);
    assert_eq!(calls.len(), 3);
    assert!(calls.iter().all(|(source, args)| {
        source == "libA" && args["patron"]["cat_username"] == "p1"
    }));
    assert_eq!(calls[0].1["details"], json!({ "ill_request_id": "5" }));
    assert_eq!(calls[1].1["details"], json!({ "id": "9", "item_id": "9-1" }));
    assert_eq!(calls[2].1["details"], json!({ "id": "libB.9" }));
}

#[tokio::test]
async fn test_cancel_details_without_patron_driver_fail() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libC.1", "libC.p1");

    let err = router
        .get_cancel_ill_request_details(&json!({ "id": "libA.9" }), &patron)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoSuitableBackend));
    let err = router
        .get_cancel_storage_retrieval_request_details(&json!({ "id": "libA.9" }), &patron)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NoSuitableBackend));
    assert!(harness.calls().is_empty());
}

#[tokio::test]
async fn test_cancel_requests_reach_patron_source() {
    let harness = Harness::extended(None);
    let mut router = harness.router();

    let details = ItemBatch::new(Patron::new("libB.2", "libB.p2"), vec!["7".to_string()]);
    let result = router.cancel_storage_retrieval_requests(&details).await.unwrap();
    assert_eq!(result["count"], 1);
    let result = router.cancel_ill_requests(&details).await.unwrap();
    assert_eq!(result["count"], 1);

    for method in [Method::CancelStorageRetrievalRequests, Method::CancelIllRequests] {
        let calls = harness.calls_to(method);
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].0, "libB");
        assert_eq!(calls[0].1["patron"]["cat_username"], "p2");
        assert_eq!(calls[0].1["details"], json!(["7"]));
    }
}

#[tokio::test]
async fn test_storage_retrieval_request_routing() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");

    let own = RequestDetails::new("libA.42", patron.clone());
    assert!(router.place_storage_retrieval_request(&own).await.unwrap().success);
    let calls = harness.calls_to(Method::PlaceStorageRetrievalRequest);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "libA");
    assert_eq!(calls[0].1["id"], "42");
    assert_eq!(calls[0].1["patron"]["cat_username"], "p1");

    let foreign = RequestDetails::new("libB.42", patron);
    let result = router.place_storage_retrieval_request(&foreign).await.unwrap();
    assert!(!result.success);
    assert_eq!(result.sys_message.as_deref(), Some("storage_wrong_user_institution"));
    assert_eq!(harness.calls_to(Method::PlaceStorageRetrievalRequest).len(), 1);
}

#[tokio::test]
async fn test_request_groups() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libA.1", "libA.p1");
    let hold = json!({ "id": "libA.42" });

    let groups = router
        .get_request_groups("libA.42", &patron, Some(&hold))
        .await
        .unwrap();
    assert_eq!(groups, vec![json!({ "id": "g1", "name": "Group" })]);
    let (source, args) = &harness.calls_to(Method::GetRequestGroups)[0];
    assert_eq!(source, "libA");
    assert_eq!(args["id"], "42");
    assert_eq!(args["patron"]["cat_username"], "p1");
    assert_eq!(args["hold"], json!({ "id": "42" }));

    // Record of another library
    assert!(router
        .get_request_groups("libB.42", &patron, None)
        .await
        .unwrap()
        .is_empty());
    assert_eq!(harness.calls_to(Method::GetRequestGroups).len(), 1);

    let default = router
        .get_default_request_group(&patron, Some(&hold))
        .await
        .unwrap();
    assert_eq!(default.as_deref(), Some("g1"));
    let (_, args) = &harness.calls_to(Method::GetDefaultRequestGroup)[0];
    assert_eq!(args["hold"], json!({ "id": "42" }));

    let foreign = json!({ "id": "libB.42" });
    assert_eq!(
        router
            .get_default_request_group(&patron, Some(&foreign))
            .await
            .unwrap(),
        None
    );
    assert_eq!(harness.calls_to(Method::GetDefaultRequestGroup).len(), 1);
}

#[tokio::test]
async fn test_transaction_history_strips_params() {
    let harness = Harness::extended(None);
    let mut router = harness.router();
    let patron = Patron::new("libB.2", "libB.p2");

    let history = router
        .get_my_transaction_history(&patron, &json!({ "id": "libB.5", "page": 2 }))
        .await
        .unwrap();
    assert_eq!(history["count"], 1);
    assert_eq!(history["transactions"][0]["id"], "libB.9");

    let (source, args) = &harness.calls_to(Method::GetMyTransactionHistory)[0];
    assert_eq!(source, "libB");
    assert_eq!(args["patron"]["cat_username"], "p2");
    assert_eq!(args["params"], json!({ "id": "5", "page": 2 }));
}

#[tokio::test]
async fn test_change_password_reaches_patron_source() {
    let harness = Harness::extended(None);
    let mut router = harness.router();

    let change = PasswordChange {
        patron: Patron::new("libB.2", "libB.p2"),
        old_password: "old".to_string(),
        new_password: "new-secret".to_string(),
    };
    assert!(router.change_password(&change).await.unwrap().success);

    let calls = harness.calls_to(Method::ChangePassword);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "libB");
    assert_eq!(calls[0].1["cat_username"], "p2");
    assert_eq!(calls[0].1["id"], "2");
}
