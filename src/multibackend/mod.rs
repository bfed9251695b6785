//! Multi-backend router
//!
//! [`MultiBackend`] fronts any number of configured backends. It works out
//! which source owns each request from the composite identifiers it is
//! given, strips the source prefix before handing the request to that
//! source's driver, and prefixes the identifiers in the driver's answer on
//! the way back.
//!
//! Read operations degrade to an empty answer when a source has no usable
//! driver or the driver lacks the operation; operations that change
//! backend state fail with [`AppError::NoSuitableBackend`] instead.

pub mod factory;
pub mod negotiator;

#[cfg(test)]
mod tests;

use std::{future::Future, sync::Arc};

use indexmap::IndexMap;
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    config::MultiBackendConfig,
    drivers::{Driver, DriverResult, Method},
    error::{AppError, AppResult},
    models::{
        ActionResult, CancelDetails, Holding, PasswordChange, Patron, RenewDetails,
        RequestDetails, RequestValidity, STATUS_ERROR_MESSAGE,
    },
    namespace::{
        self, Namespaced, ScopedId, DEFAULT_ID_FIELDS, HOLD_ID_FIELDS, RECORD_ID_FIELDS,
        RESERVE_ID_FIELDS,
    },
};

pub use factory::{
    ConfigLoader, DriverFactory, DriverManager, FileConfigLoader, StaticConfigLoader,
};
pub use negotiator::driver_supports_method;

/// Parameter keys that may carry a composite identifier
const SOURCE_PARAM_KEYS: &[&str] = &["0", "id", "cat_username"];

const HOLD_WRONG_INSTITUTION: &str = "hold_wrong_user_institution";
const STORAGE_WRONG_INSTITUTION: &str = "storage_wrong_user_institution";

/// Request-scoped router over the configured backends
pub struct MultiBackend {
    config: Arc<MultiBackendConfig>,
    drivers: DriverFactory,
    /// Catalog credentials of the caller, if logged in
    stored_patron: Option<Patron>,
}

impl MultiBackend {
    pub fn new(
        config: Arc<MultiBackendConfig>,
        manager: Arc<DriverManager>,
        loader: Arc<dyn ConfigLoader>,
    ) -> Self {
        Self {
            drivers: DriverFactory::new(config.clone(), manager, loader),
            config,
            stored_patron: None,
        }
    }

    pub fn with_stored_patron(mut self, patron: Option<Patron>) -> Self {
        self.stored_patron = patron;
        self
    }

    // ----- Catalog -------------------------------------------------------

    pub async fn get_status(&mut self, id: &ScopedId) -> AppResult<Vec<Holding>> {
        let source = id.source().to_string();
        let local_id = id.local();
        let Some(driver) = self
            .supported_driver(&source, Method::GetStatus, &json!([local_id]))
            .await?
        else {
            return Ok(Vec::new());
        };
        let mut status = driver.get_status(local_id).await?;
        status.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(status)
    }

    /// Status of many records, one batch per source.
    ///
    /// Sources without a driver contribute nothing; a source whose lookup
    /// fails contributes an error placeholder per record.
    pub async fn get_statuses(&mut self, ids: &[ScopedId]) -> AppResult<Vec<Vec<Holding>>> {
        let mut grouped: IndexMap<String, Vec<String>> = IndexMap::new();
        for id in ids {
            grouped
                .entry(id.source().to_string())
                .or_default()
                .push(id.local().to_string());
        }

        let mut results = Vec::with_capacity(ids.len());
        for (source, local_ids) in grouped {
            let statuses = match self.drivers.get_driver(&source).await {
                Ok(Some(driver)) => match driver.get_statuses(&local_ids).await {
                    Ok(statuses) => statuses,
                    Err(e) => {
                        tracing::warn!("Status lookup failed for source '{}': {}", source, e);
                        error_placeholders(&local_ids)
                    }
                },
                Ok(None) => {
                    tracing::debug!("No driver for source '{}', skipping {} ids", source, local_ids.len());
                    continue;
                }
                Err(e) => {
                    tracing::warn!("{}", e);
                    error_placeholders(&local_ids)
                }
            };
            for mut status in statuses {
                status.add_prefixes(&source, DEFAULT_ID_FIELDS);
                results.push(status);
            }
        }
        Ok(results)
    }

    /// Holdings of a record; a patron of another source is not passed on
    pub async fn get_holding(
        &mut self,
        id: &ScopedId,
        patron: Option<&Patron>,
        options: &Value,
    ) -> AppResult<Vec<Holding>> {
        let source = id.source().to_string();
        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(Vec::new());
        };
        let patron = patron
            .filter(|p| supports_source(driver.as_ref(), &source, &p.cat_username))
            .map(|p| stripped(p, &source, DEFAULT_ID_FIELDS));
        let local_id = id.local();
        if !driver_supports_method(
            driver.as_ref(),
            Method::GetHolding,
            &params_of(&(local_id, &patron)),
        ) {
            return Ok(Vec::new());
        }
        let mut holdings = driver
            .get_holding(local_id, patron.as_ref(), options)
            .await?;
        holdings.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(holdings)
    }

    pub async fn get_purchase_history(&mut self, id: &ScopedId) -> AppResult<Vec<Value>> {
        let source = id.source().to_string();
        let local_id = id.local();
        match self
            .supported_driver(&source, Method::GetPurchaseHistory, &json!([local_id]))
            .await?
        {
            Some(driver) => Ok(driver.get_purchase_history(local_id).await?),
            None => Ok(Vec::new()),
        }
    }

    /// Recently added records of the default backend
    pub async fn get_new_items(
        &mut self,
        page: u32,
        limit: u32,
        days_old: u32,
        fund_id: Option<&str>,
    ) -> AppResult<Value> {
        let source = self.default_source();
        let Some(driver) = self
            .supported_driver(&source, Method::GetNewItems, &Value::Null)
            .await?
        else {
            return Ok(json!({ "count": 0, "results": [] }));
        };
        let mut items = driver.get_new_items(page, limit, days_old, fund_id).await?;
        if let Some(results) = items.get_mut("results") {
            results.add_prefixes(&source, DEFAULT_ID_FIELDS);
        }
        Ok(items)
    }

    pub async fn get_departments(&mut self) -> AppResult<IndexMap<String, String>> {
        match self.default_driver(Method::GetDepartments).await? {
            Some(driver) => Ok(driver.get_departments().await?),
            None => Ok(IndexMap::new()),
        }
    }

    pub async fn get_instructors(&mut self) -> AppResult<IndexMap<String, String>> {
        match self.default_driver(Method::GetInstructors).await? {
            Some(driver) => Ok(driver.get_instructors().await?),
            None => Ok(IndexMap::new()),
        }
    }

    pub async fn get_courses(&mut self) -> AppResult<IndexMap<String, String>> {
        match self.default_driver(Method::GetCourses).await? {
            Some(driver) => Ok(driver.get_courses().await?),
            None => Ok(IndexMap::new()),
        }
    }

    pub async fn find_reserves(
        &mut self,
        course: &str,
        instructor: &str,
        department: &str,
    ) -> AppResult<Vec<Value>> {
        let source = self.default_source();
        let Some(driver) = self.default_driver(Method::FindReserves).await? else {
            return Ok(Vec::new());
        };
        let mut reserves = driver.find_reserves(course, instructor, department).await?;
        reserves.add_prefixes(&source, RESERVE_ID_FIELDS);
        Ok(reserves)
    }

    // ----- Login ---------------------------------------------------------

    pub fn get_login_drivers(&self) -> Vec<String> {
        self.config.login.drivers.clone()
    }

    pub fn get_default_login_driver(&self) -> String {
        self.config.default_login_driver()
    }

    /// Authenticate against the source named by the username prefix, or the
    /// default login source for an unprefixed username
    pub async fn patron_login(
        &mut self,
        username: &str,
        password: &str,
    ) -> AppResult<Option<Patron>> {
        let source = match namespace::parse_source(username) {
            "" => self.get_default_login_driver(),
            source => source.to_string(),
        };
        let driver = self
            .required_driver(&source, Method::PatronLogin, &Value::Null)
            .await?;
        let mut patron = driver
            .patron_login(namespace::parse_local(username), password)
            .await?;
        patron.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(patron)
    }

    // ----- Patron account ------------------------------------------------

    pub async fn get_my_profile(&mut self, patron: &Patron) -> AppResult<Value> {
        let source = patron.source().to_string();
        let local = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let Some(driver) = self
            .supported_driver(&source, Method::GetMyProfile, &params_of(&[&local]))
            .await?
        else {
            return Ok(json!({}));
        };
        let mut profile = driver.get_my_profile(&local).await?;
        profile.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(profile)
    }

    pub async fn get_my_transactions(&mut self, patron: &Patron) -> AppResult<Vec<Value>> {
        self.call_for_patron(patron, Method::GetMyTransactions, DEFAULT_ID_FIELDS, |driver, patron| async move {
            driver.get_my_transactions(&patron).await
        })
        .await
    }

    pub async fn get_my_transaction_history(
        &mut self,
        patron: &Patron,
        params: &Value,
    ) -> AppResult<Value> {
        let source = patron.source().to_string();
        let local = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let params = stripped(params, &source, DEFAULT_ID_FIELDS);
        let Some(driver) = self
            .supported_driver(&source, Method::GetMyTransactionHistory, &params_of(&(&local, &params)))
            .await?
        else {
            return Ok(json!({ "count": 0, "transactions": [] }));
        };
        let mut history = driver.get_my_transaction_history(&local, &params).await?;
        history.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(history)
    }

    pub async fn get_my_holds(&mut self, patron: &Patron) -> AppResult<Vec<Value>> {
        self.call_for_patron(patron, Method::GetMyHolds, HOLD_ID_FIELDS, |driver, patron| async move {
            driver.get_my_holds(&patron).await
        })
        .await
    }

    pub async fn get_my_fines(&mut self, patron: &Patron) -> AppResult<Vec<Value>> {
        self.call_for_patron(patron, Method::GetMyFines, DEFAULT_ID_FIELDS, |driver, patron| async move {
            driver.get_my_fines(&patron).await
        })
        .await
    }

    pub async fn get_my_storage_retrieval_requests(
        &mut self,
        patron: &Patron,
    ) -> AppResult<Vec<Value>> {
        self.call_for_patron(
            patron,
            Method::GetMyStorageRetrievalRequests,
            DEFAULT_ID_FIELDS,
            |driver, patron| async move { driver.get_my_storage_retrieval_requests(&patron).await },
        )
        .await
    }

    pub async fn get_my_ill_requests(&mut self, patron: &Patron) -> AppResult<Vec<Value>> {
        self.call_for_patron(patron, Method::GetMyIllRequests, HOLD_ID_FIELDS, |driver, patron| async move {
            driver.get_my_ill_requests(&patron).await
        })
        .await
    }

    pub async fn get_request_blocks(&mut self, patron: &Patron) -> AppResult<Vec<String>> {
        let source = patron.source().to_string();
        let local = stripped(patron, &source, DEFAULT_ID_FIELDS);
        match self
            .supported_driver(&source, Method::GetRequestBlocks, &params_of(&[&local]))
            .await?
        {
            Some(driver) => Ok(driver.get_request_blocks(&local).await?),
            None => Ok(Vec::new()),
        }
    }

    pub async fn get_account_blocks(&mut self, patron: &Patron) -> AppResult<Vec<String>> {
        let source = patron.source().to_string();
        let local = stripped(patron, &source, DEFAULT_ID_FIELDS);
        match self
            .supported_driver(&source, Method::GetAccountBlocks, &params_of(&[&local]))
            .await?
        {
            Some(driver) => Ok(driver.get_account_blocks(&local).await?),
            None => Ok(Vec::new()),
        }
    }

    // ----- Renewals ------------------------------------------------------

    /// Driver reference used to renew the checked out item `checkout`
    pub async fn get_renew_details(&mut self, checkout: &Value) -> AppResult<String> {
        let source = value_source(checkout, &["id"]);
        let checkout = stripped(checkout, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::GetRenewDetails, &checkout)
            .await?;
        Ok(driver.get_renew_details(&checkout).await?)
    }

    pub async fn renew_my_items(&mut self, details: &RenewDetails) -> AppResult<Value> {
        let source = details.patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::RenewMyItems, &params_of(&[&details]))
            .await?;
        let mut result = driver.renew_my_items(&details).await?;
        result.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(result)
    }

    // ----- Holds ---------------------------------------------------------

    pub async fn check_request_is_valid(
        &mut self,
        id: &str,
        data: &Value,
        patron: &Patron,
    ) -> AppResult<RequestValidity> {
        self.check_validity(Method::CheckRequestIsValid, id, data, patron)
            .await
    }

    pub async fn get_pick_up_locations(
        &mut self,
        patron: Option<&Patron>,
        hold_details: Option<&Value>,
    ) -> AppResult<Vec<Value>> {
        let hold_id = hold_details
            .map(|hold| value_source_id(hold, &["id", "item_id"]))
            .unwrap_or_default();
        let owner = patron.map(|p| p.cat_username.as_str()).unwrap_or(hold_id.as_str());
        let source = namespace::parse_source(owner).to_string();

        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(Vec::new());
        };
        if !hold_id.is_empty() && !supports_source(driver.as_ref(), &source, &hold_id) {
            return Ok(Vec::new());
        }
        let patron = patron.map(|p| stripped(p, &source, DEFAULT_ID_FIELDS));
        let hold = hold_details.map(|h| stripped(h, &source, HOLD_ID_FIELDS));
        if !driver_supports_method(
            driver.as_ref(),
            Method::GetPickUpLocations,
            &params_of(&(&patron, &hold)),
        ) {
            return Ok(Vec::new());
        }
        let mut locations = driver
            .get_pick_up_locations(patron.as_ref(), hold.as_ref())
            .await?;
        locations.add_prefixes(&source, DEFAULT_ID_FIELDS);
        Ok(locations)
    }

    pub async fn get_default_pick_up_location(
        &mut self,
        patron: Option<&Patron>,
        hold_details: Option<&Value>,
    ) -> AppResult<Option<String>> {
        let source = patron.map(Patron::source).unwrap_or_default().to_string();
        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(None);
        };
        if let Some(hold) = hold_details {
            let hold_id = value_source_id(hold, &["id"]);
            if !supports_source(driver.as_ref(), &source, &hold_id) {
                return Ok(None);
            }
        }
        let patron = patron.map(|p| stripped(p, &source, DEFAULT_ID_FIELDS));
        let hold = hold_details.map(|h| stripped(h, &source, DEFAULT_ID_FIELDS));
        if !driver_supports_method(
            driver.as_ref(),
            Method::GetDefaultPickUpLocation,
            &params_of(&(&patron, &hold)),
        ) {
            return Ok(None);
        }
        Ok(driver
            .get_default_pick_up_location(patron.as_ref(), hold.as_ref())
            .await?)
    }

    pub async fn get_request_groups(
        &mut self,
        id: &str,
        patron: &Patron,
        hold_details: Option<&Value>,
    ) -> AppResult<Vec<Value>> {
        let source = patron.source().to_string();
        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(Vec::new());
        };
        let local_id = namespace::strip_prefix(id, &source);
        let patron = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let hold = hold_details.map(|h| stripped(h, &source, DEFAULT_ID_FIELDS));
        if !supports_source(driver.as_ref(), &source, id)
            || !driver_supports_method(
                driver.as_ref(),
                Method::GetRequestGroups,
                &params_of(&(local_id, &patron, &hold)),
            )
        {
            return Ok(Vec::new());
        }
        Ok(driver
            .get_request_groups(local_id, &patron, hold.as_ref())
            .await?)
    }

    pub async fn get_default_request_group(
        &mut self,
        patron: &Patron,
        hold_details: Option<&Value>,
    ) -> AppResult<Option<String>> {
        let source = patron.source().to_string();
        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(None);
        };
        if let Some(hold) = hold_details {
            let hold_id = value_source_id(hold, &["id"]);
            if !supports_source(driver.as_ref(), &source, &hold_id) {
                return Ok(None);
            }
        }
        let patron = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let hold = hold_details.map(|h| stripped(h, &source, DEFAULT_ID_FIELDS));
        if !driver_supports_method(
            driver.as_ref(),
            Method::GetDefaultRequestGroup,
            &params_of(&(&patron, &hold)),
        ) {
            return Ok(None);
        }
        Ok(driver
            .get_default_request_group(&patron, hold.as_ref())
            .await?)
    }

    /// Place a hold for the patron's own institution.
    ///
    /// A record of another source is refused with a structured failure
    /// before any driver call is made.
    pub async fn place_hold(&mut self, details: &RequestDetails) -> AppResult<ActionResult> {
        let source = details.patron.source().to_string();
        let driver = self
            .drivers
            .get_driver(&source)
            .await?
            .ok_or(AppError::NoSuitableBackend)?;
        if !supports_source(driver.as_ref(), &source, &details.id) {
            return Ok(ActionResult::failure(HOLD_WRONG_INSTITUTION));
        }
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        if !driver_supports_method(driver.as_ref(), Method::PlaceHold, &params_of(&[&details])) {
            return Err(AppError::NoSuitableBackend);
        }
        Ok(driver.place_hold(&details).await?)
    }

    pub async fn cancel_holds(&mut self, details: &CancelDetails) -> AppResult<Value> {
        let source = details.patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::CancelHolds, &params_of(&[&details]))
            .await?;
        Ok(driver.cancel_holds(&details).await?)
    }

    /// Driver reference used to cancel `hold`.
    ///
    /// The owning source comes from the patron, else from the hold's record
    /// or item id.
    pub async fn get_cancel_hold_details(
        &mut self,
        hold: &Value,
        patron: Option<&Patron>,
    ) -> AppResult<String> {
        let source = match patron {
            Some(patron) => patron.source().to_string(),
            None => value_source(hold, &["id", "item_id"]),
        };
        let hold = stripped(hold, &source, HOLD_ID_FIELDS);
        let patron = patron.map(|p| stripped(p, &source, DEFAULT_ID_FIELDS));
        let driver = self
            .required_driver(&source, Method::GetCancelHoldDetails, &params_of(&(&hold, &patron)))
            .await?;
        Ok(driver.get_cancel_hold_details(&hold, patron.as_ref()).await?)
    }

    // ----- Storage retrieval requests ------------------------------------

    pub async fn check_storage_retrieval_request_is_valid(
        &mut self,
        id: &str,
        data: &Value,
        patron: &Patron,
    ) -> AppResult<RequestValidity> {
        self.check_validity(Method::CheckStorageRetrievalRequestIsValid, id, data, patron)
            .await
    }

    pub async fn place_storage_retrieval_request(
        &mut self,
        details: &RequestDetails,
    ) -> AppResult<ActionResult> {
        let source = details.patron.source().to_string();
        let local = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::PlaceStorageRetrievalRequest, &params_of(&[&local]))
            .await?;
        if !supports_source(driver.as_ref(), &source, &details.id) {
            return Ok(ActionResult::failure(STORAGE_WRONG_INSTITUTION));
        }
        Ok(driver.place_storage_retrieval_request(&local).await?)
    }

    pub async fn cancel_storage_retrieval_requests(
        &mut self,
        details: &CancelDetails,
    ) -> AppResult<Value> {
        let source = details.patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(
                &source,
                Method::CancelStorageRetrievalRequests,
                &params_of(&[&details]),
            )
            .await?;
        Ok(driver.cancel_storage_retrieval_requests(&details).await?)
    }

    pub async fn get_cancel_storage_retrieval_request_details(
        &mut self,
        details: &Value,
        patron: &Patron,
    ) -> AppResult<String> {
        let source = patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let patron = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(
                &source,
                Method::GetCancelStorageRetrievalRequestDetails,
                &params_of(&(&details, &patron)),
            )
            .await?;
        Ok(driver
            .get_cancel_storage_retrieval_request_details(&details, &patron)
            .await?)
    }

    // ----- Interlibrary loan ---------------------------------------------
    //
    // The ILL patron usually belongs to another library than the record, so
    // it is passed to the record's driver with its prefix intact.

    pub async fn check_ill_request_is_valid(
        &mut self,
        id: &str,
        data: &Value,
        patron: &Patron,
    ) -> AppResult<RequestValidity> {
        let source = namespace::parse_source(id).to_string();
        let local_id = namespace::strip_prefix(id, &source);
        let data = stripped(data, &source, DEFAULT_ID_FIELDS);
        match self
            .supported_driver(
                &source,
                Method::CheckIllRequestIsValid,
                &params_of(&(local_id, &data, patron)),
            )
            .await?
        {
            Some(driver) => Ok(driver.check_ill_request_is_valid(local_id, &data, patron).await?),
            None => Ok(RequestValidity::invalid()),
        }
    }

    pub async fn get_ill_pickup_libraries(
        &mut self,
        id: &str,
        patron: &Patron,
    ) -> AppResult<Option<Vec<Value>>> {
        let source = namespace::parse_source(id).to_string();
        let local_id = namespace::strip_prefix(id, &source);
        match self
            .supported_driver(
                &source,
                Method::GetIllPickupLibraries,
                &params_of(&(local_id, patron)),
            )
            .await?
        {
            Some(driver) => Ok(driver.get_ill_pickup_libraries(local_id, patron).await?),
            None => Ok(None),
        }
    }

    pub async fn get_ill_pickup_locations(
        &mut self,
        id: &str,
        pickup_library: &str,
        patron: &Patron,
    ) -> AppResult<Option<Vec<Value>>> {
        let source = namespace::parse_source(id).to_string();
        let local_id = namespace::strip_prefix(id, &source);
        match self
            .supported_driver(
                &source,
                Method::GetIllPickupLocations,
                &params_of(&(local_id, pickup_library, patron)),
            )
            .await?
        {
            Some(driver) => Ok(driver
                .get_ill_pickup_locations(local_id, pickup_library, patron)
                .await?),
            None => Ok(None),
        }
    }

    pub async fn place_ill_request(&mut self, details: &RequestDetails) -> AppResult<ActionResult> {
        let source = namespace::parse_source(&details.id).to_string();
        let mut local = details.clone();
        local.strip_prefixes(&source, RECORD_ID_FIELDS, &["patron"]);
        let driver = self
            .required_driver(&source, Method::PlaceIllRequest, &params_of(&[&local]))
            .await?;
        Ok(driver.place_ill_request(&local).await?)
    }

    pub async fn cancel_ill_requests(&mut self, details: &CancelDetails) -> AppResult<Value> {
        let source = details.patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::CancelIllRequests, &params_of(&[&details]))
            .await?;
        Ok(driver.cancel_ill_requests(&details).await?)
    }

    pub async fn get_cancel_ill_request_details(
        &mut self,
        details: &Value,
        patron: &Patron,
    ) -> AppResult<String> {
        let source = patron.source().to_string();
        let details = stripped(details, &source, HOLD_ID_FIELDS);
        let patron = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(
                &source,
                Method::GetCancelIllRequestDetails,
                &params_of(&(&details, &patron)),
            )
            .await?;
        Ok(driver.get_cancel_ill_request_details(&details, &patron).await?)
    }

    // ----- Account -------------------------------------------------------

    pub async fn change_password(&mut self, details: &PasswordChange) -> AppResult<ActionResult> {
        let source = details.patron.source().to_string();
        let details = stripped(details, &source, DEFAULT_ID_FIELDS);
        let driver = self
            .required_driver(&source, Method::ChangePassword, &params_of(&[&details.patron]))
            .await?;
        Ok(driver.change_password(&details).await?)
    }

    // ----- Introspection -------------------------------------------------

    /// Settings of an optional feature of the backend owning the request,
    /// or of the logged-in patron's backend when `params` name no source
    pub async fn get_config(&mut self, function: &str, params: &Value) -> AppResult<Option<Value>> {
        let check_fields = Method::from_name(function).and_then(Method::source_check_field);
        let mut source = match check_fields {
            Some(field) => self.source_from_params(params, &[field]),
            None => self.source_from_params(params, SOURCE_PARAM_KEYS),
        };
        if source.is_empty() {
            if let Some(patron) = &self.stored_patron {
                source = patron.source().to_string();
            }
        }
        let Some(driver) = self
            .supported_driver(&source, Method::GetConfig, params)
            .await?
        else {
            return Ok(None);
        };
        let params = stripped(params, &source, DEFAULT_ID_FIELDS);
        Ok(driver.get_config(function, &params).await?)
    }

    /// Whether the backend owning a call with these parameters can perform
    /// `method`
    pub async fn supports_method(&mut self, method: Method, params: &Value) -> AppResult<bool> {
        if matches!(method, Method::GetLoginDrivers | Method::GetDefaultLoginDriver) {
            return Ok(true);
        }
        let mut source = self.source_for_method(method, params);
        if source.is_empty() {
            source = self.default_source();
        }
        if source.is_empty() {
            // No source to ask; only methods without source-specific
            // parameters are known to be unanswerable
            return Ok(method.has_source_specific_params());
        }
        Ok(self.supported_driver(&source, method, params).await?.is_some())
    }

    // ----- Helpers -------------------------------------------------------

    fn default_source(&self) -> String {
        self.config.default_driver.clone().unwrap_or_default()
    }

    async fn default_driver(&mut self, method: Method) -> AppResult<Option<Arc<dyn Driver>>> {
        let source = self.default_source();
        self.supported_driver(&source, method, &Value::Null).await
    }

    /// Driver of `source` if it can perform `method`
    async fn supported_driver(
        &mut self,
        source: &str,
        method: Method,
        params: &Value,
    ) -> AppResult<Option<Arc<dyn Driver>>> {
        Ok(self
            .drivers
            .get_driver(source)
            .await?
            .filter(|driver| driver_supports_method(driver.as_ref(), method, params)))
    }

    /// Like [`Self::supported_driver`], for operations that cannot degrade
    async fn required_driver(
        &mut self,
        source: &str,
        method: Method,
        params: &Value,
    ) -> AppResult<Arc<dyn Driver>> {
        self.supported_driver(source, method, params)
            .await?
            .ok_or(AppError::NoSuitableBackend)
    }

    /// Shared shape of the patron list reads
    async fn call_for_patron<T, F, Fut>(
        &mut self,
        patron: &Patron,
        method: Method,
        fields: &[&str],
        call: F,
    ) -> AppResult<T>
    where
        T: Namespaced + Default,
        F: FnOnce(Arc<dyn Driver>, Patron) -> Fut,
        Fut: Future<Output = DriverResult<T>>,
    {
        let source = patron.source().to_string();
        let local = stripped(patron, &source, DEFAULT_ID_FIELDS);
        let Some(driver) = self
            .supported_driver(&source, method, &params_of(&[&local]))
            .await?
        else {
            return Ok(T::default());
        };
        let mut result = call(driver, local).await?;
        result.add_prefixes(&source, fields);
        Ok(result)
    }

    async fn check_validity(
        &mut self,
        method: Method,
        id: &str,
        data: &Value,
        patron: &Patron,
    ) -> AppResult<RequestValidity> {
        if patron.cat_username.is_empty() {
            return Ok(RequestValidity::invalid());
        }
        let source = patron.source().to_string();
        let Some(driver) = self.drivers.get_driver(&source).await? else {
            return Ok(RequestValidity::invalid());
        };
        if !supports_source(driver.as_ref(), &source, id) {
            return Ok(RequestValidity::invalid());
        }
        let local_id = namespace::strip_prefix(id, &source);
        let data = stripped(data, &source, DEFAULT_ID_FIELDS);
        let patron = stripped(patron, &source, DEFAULT_ID_FIELDS);
        if !driver_supports_method(driver.as_ref(), method, &params_of(&(local_id, &data, &patron))) {
            return Ok(RequestValidity::invalid());
        }
        let validity = match method {
            Method::CheckStorageRetrievalRequestIsValid => {
                driver
                    .check_storage_retrieval_request_is_valid(local_id, &data, &patron)
                    .await?
            }
            _ => driver.check_request_is_valid(local_id, &data, &patron).await?,
        };
        Ok(validity)
    }

    fn source_for_method(&self, method: Method, params: &Value) -> String {
        match method.source_check_field() {
            Some(field) => self.source_from_params(params, &[field]),
            None => self.source_from_params(params, SOURCE_PARAM_KEYS),
        }
    }

    /// First registered source found in `params`.
    ///
    /// Looks at the keys in `allowed`, descending into positional entries
    /// and a nested `patron`.
    fn source_from_params(&self, params: &Value, allowed: &[&str]) -> String {
        let registered = |id: &str| {
            let source = namespace::parse_source(id);
            (!source.is_empty() && self.drivers.is_registered(source)).then(|| source.to_string())
        };
        let check = |key: &str, value: &Value| -> Option<String> {
            match value {
                Value::Array(_) | Value::Object(_) if is_position(key) || key == "patron" => {
                    Some(self.source_from_params(value, allowed)).filter(|s| !s.is_empty())
                }
                Value::String(id) if allowed.contains(&key) => registered(id.as_str()),
                _ => None,
            }
        };
        let found = match params {
            Value::String(id) => registered(id.as_str()),
            Value::Array(items) => items
                .iter()
                .enumerate()
                .find_map(|(index, value)| check(index.to_string().as_str(), value)),
            Value::Object(map) => map.iter().find_map(|(key, value)| check(key.as_str(), value)),
            _ => None,
        };
        found.unwrap_or_default()
    }
}

fn is_position(key: &str) -> bool {
    !key.is_empty() && key.bytes().all(|b| b.is_ascii_digit())
}

/// Whether the driver of `source` may serve the record or patron `id`
fn supports_source(driver: &dyn Driver, source: &str, id: &str) -> bool {
    namespace::parse_source(id) == source || driver.accepts_any_source()
}

fn stripped<T: Namespaced + Clone>(value: &T, source: &str, fields: &[&str]) -> T {
    let mut local = value.clone();
    local.strip_prefixes(source, fields, &[]);
    local
}

/// Arguments as seen by a driver's capability predicate
fn params_of<T: Serialize + ?Sized>(args: &T) -> Value {
    serde_json::to_value(args).unwrap_or_default()
}

/// First non-empty string among `keys` of a loosely typed record
fn value_source_id(value: &Value, keys: &[&str]) -> String {
    keys.iter()
        .filter_map(|key| value.get(*key).and_then(Value::as_str))
        .find(|id| !id.is_empty())
        .unwrap_or_default()
        .to_string()
}

fn value_source(value: &Value, keys: &[&str]) -> String {
    namespace::parse_source(&value_source_id(value, keys)).to_string()
}

fn error_placeholders(local_ids: &[String]) -> Vec<Vec<Holding>> {
    local_ids
        .iter()
        .map(|id| vec![Holding::error(id.clone(), STATUS_ERROR_MESSAGE)])
        .collect()
}
