//! Backend driver contract
//!
//! A driver adapts one library system to the operations below. Every
//! optional operation has a default body reporting [`DriverError::Unsupported`],
//! so a driver only overrides what its backend can do and lists those
//! operations in [`Driver::capabilities`].

pub mod demo;

use std::fmt;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    ActionResult, CancelDetails, Holding, PasswordChange, Patron, RenewDetails, RequestDetails,
    RequestValidity,
};

pub use demo::DemoDriver;

/// Backend-specific configuration injected before `init`
pub type DriverConfig = Value;

/// Errors reported by a driver
#[derive(Error, Debug)]
pub enum DriverError {
    #[error("Driver configuration error: {0}")]
    Configuration(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Operation not supported: {0}")]
    Unsupported(Method),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Operations of the driver contract, named as the catalog API knows them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    GetStatus,
    GetStatuses,
    GetHolding,
    GetPurchaseHistory,
    GetNewItems,
    GetCourses,
    GetInstructors,
    GetDepartments,
    FindReserves,
    PatronLogin,
    GetMyProfile,
    GetMyTransactions,
    GetMyTransactionHistory,
    GetMyHolds,
    GetMyFines,
    GetMyStorageRetrievalRequests,
    GetMyIllRequests,
    GetRenewDetails,
    RenewMyItems,
    CheckRequestIsValid,
    CheckStorageRetrievalRequestIsValid,
    CheckIllRequestIsValid,
    GetPickUpLocations,
    GetDefaultPickUpLocation,
    GetRequestGroups,
    GetDefaultRequestGroup,
    PlaceHold,
    CancelHolds,
    GetCancelHoldDetails,
    PlaceStorageRetrievalRequest,
    CancelStorageRetrievalRequests,
    GetCancelStorageRetrievalRequestDetails,
    GetIllPickupLibraries,
    GetIllPickupLocations,
    PlaceIllRequest,
    CancelIllRequests,
    GetCancelIllRequestDetails,
    ChangePassword,
    GetRequestBlocks,
    GetAccountBlocks,
    GetConfig,
    GetLoginDrivers,
    GetDefaultLoginDriver,
}

impl Method {
    pub const ALL: &'static [Method] = &[
        Method::GetStatus,
        Method::GetStatuses,
        Method::GetHolding,
        Method::GetPurchaseHistory,
        Method::GetNewItems,
        Method::GetCourses,
        Method::GetInstructors,
        Method::GetDepartments,
        Method::FindReserves,
        Method::PatronLogin,
        Method::GetMyProfile,
        Method::GetMyTransactions,
        Method::GetMyTransactionHistory,
        Method::GetMyHolds,
        Method::GetMyFines,
        Method::GetMyStorageRetrievalRequests,
        Method::GetMyIllRequests,
        Method::GetRenewDetails,
        Method::RenewMyItems,
        Method::CheckRequestIsValid,
        Method::CheckStorageRetrievalRequestIsValid,
        Method::CheckIllRequestIsValid,
        Method::GetPickUpLocations,
        Method::GetDefaultPickUpLocation,
        Method::GetRequestGroups,
        Method::GetDefaultRequestGroup,
        Method::PlaceHold,
        Method::CancelHolds,
        Method::GetCancelHoldDetails,
        Method::PlaceStorageRetrievalRequest,
        Method::CancelStorageRetrievalRequests,
        Method::GetCancelStorageRetrievalRequestDetails,
        Method::GetIllPickupLibraries,
        Method::GetIllPickupLocations,
        Method::PlaceIllRequest,
        Method::CancelIllRequests,
        Method::GetCancelIllRequestDetails,
        Method::ChangePassword,
        Method::GetRequestBlocks,
        Method::GetAccountBlocks,
        Method::GetConfig,
        Method::GetLoginDrivers,
        Method::GetDefaultLoginDriver,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Method::GetStatus => "getStatus",
            Method::GetStatuses => "getStatuses",
            Method::GetHolding => "getHolding",
            Method::GetPurchaseHistory => "getPurchaseHistory",
            Method::GetNewItems => "getNewItems",
            Method::GetCourses => "getCourses",
            Method::GetInstructors => "getInstructors",
            Method::GetDepartments => "getDepartments",
            Method::FindReserves => "findReserves",
            Method::PatronLogin => "patronLogin",
            Method::GetMyProfile => "getMyProfile",
            Method::GetMyTransactions => "getMyTransactions",
            Method::GetMyTransactionHistory => "getMyTransactionHistory",
            Method::GetMyHolds => "getMyHolds",
            Method::GetMyFines => "getMyFines",
            Method::GetMyStorageRetrievalRequests => "getMyStorageRetrievalRequests",
            Method::GetMyIllRequests => "getMyILLRequests",
            Method::GetRenewDetails => "getRenewDetails",
            Method::RenewMyItems => "renewMyItems",
            Method::CheckRequestIsValid => "checkRequestIsValid",
            Method::CheckStorageRetrievalRequestIsValid => "checkStorageRetrievalRequestIsValid",
            Method::CheckIllRequestIsValid => "checkILLRequestIsValid",
            Method::GetPickUpLocations => "getPickUpLocations",
            Method::GetDefaultPickUpLocation => "getDefaultPickUpLocation",
            Method::GetRequestGroups => "getRequestGroups",
            Method::GetDefaultRequestGroup => "getDefaultRequestGroup",
            Method::PlaceHold => "placeHold",
            Method::CancelHolds => "cancelHolds",
            Method::GetCancelHoldDetails => "getCancelHoldDetails",
            Method::PlaceStorageRetrievalRequest => "placeStorageRetrievalRequest",
            Method::CancelStorageRetrievalRequests => "cancelStorageRetrievalRequests",
            Method::GetCancelStorageRetrievalRequestDetails => {
                "getCancelStorageRetrievalRequestDetails"
            }
            Method::GetIllPickupLibraries => "getILLPickupLibraries",
            Method::GetIllPickupLocations => "getILLPickupLocations",
            Method::PlaceIllRequest => "placeILLRequest",
            Method::CancelIllRequests => "cancelILLRequests",
            Method::GetCancelIllRequestDetails => "getCancelILLRequestDetails",
            Method::ChangePassword => "changePassword",
            Method::GetRequestBlocks => "getRequestBlocks",
            Method::GetAccountBlocks => "getAccountBlocks",
            Method::GetConfig => "getConfig",
            Method::GetLoginDrivers => "getLoginDrivers",
            Method::GetDefaultLoginDriver => "getDefaultLoginDriver",
        }
    }

    /// Resolve a contract name such as `getMyHolds`
    pub fn from_name(name: &str) -> Option<Method> {
        Method::ALL.iter().copied().find(|method| method.name() == name)
    }

    /// Parameter field that identifies the owning source, when the
    /// operation is always scoped to a patron
    pub const fn source_check_field(self) -> Option<&'static str> {
        match self {
            Method::CancelHolds
            | Method::CancelIllRequests
            | Method::CancelStorageRetrievalRequests
            | Method::ChangePassword
            | Method::GetCancelHoldDetails
            | Method::GetCancelIllRequestDetails
            | Method::GetCancelStorageRetrievalRequestDetails
            | Method::GetMyFines
            | Method::GetMyProfile
            | Method::GetMyTransactionHistory
            | Method::GetMyTransactions
            | Method::RenewMyItems => Some("cat_username"),
            _ => None,
        }
    }

    /// False for operations whose parameters never name a source; those are
    /// only served by the default backend.
    pub const fn has_source_specific_params(self) -> bool {
        !matches!(
            self,
            Method::FindReserves
                | Method::GetCourses
                | Method::GetDepartments
                | Method::GetInstructors
                | Method::GetNewItems
        )
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The capability contract every backend driver satisfies
#[async_trait]
pub trait Driver: Send + Sync {
    /// Inject backend configuration; called once before [`Driver::init`]
    fn set_config(&mut self, config: DriverConfig);

    /// Validate configuration and acquire resources
    async fn init(&mut self) -> DriverResult<()> {
        Ok(())
    }

    /// Operations this driver implements
    fn capabilities(&self) -> &'static [Method];

    /// Explicit capability predicate; `None` defers to [`Driver::capabilities`]
    fn supports_method(&self, _method: Method, _params: &Value) -> Option<bool> {
        None
    }

    /// Whether the driver serves records of any source, not just its own
    fn accepts_any_source(&self) -> bool {
        false
    }

    async fn get_status(&self, _id: &str) -> DriverResult<Vec<Holding>> {
        Err(DriverError::Unsupported(Method::GetStatus))
    }

    async fn get_statuses(&self, ids: &[String]) -> DriverResult<Vec<Vec<Holding>>> {
        let mut statuses = Vec::with_capacity(ids.len());
        for id in ids {
            statuses.push(self.get_status(id).await?);
        }
        Ok(statuses)
    }

    async fn get_holding(
        &self,
        _id: &str,
        _patron: Option<&Patron>,
        _options: &Value,
    ) -> DriverResult<Vec<Holding>> {
        Err(DriverError::Unsupported(Method::GetHolding))
    }

    async fn get_purchase_history(&self, _id: &str) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetPurchaseHistory))
    }

    async fn get_new_items(
        &self,
        _page: u32,
        _limit: u32,
        _days_old: u32,
        _fund_id: Option<&str>,
    ) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::GetNewItems))
    }

    async fn get_courses(&self) -> DriverResult<IndexMap<String, String>> {
        Err(DriverError::Unsupported(Method::GetCourses))
    }

    async fn get_instructors(&self) -> DriverResult<IndexMap<String, String>> {
        Err(DriverError::Unsupported(Method::GetInstructors))
    }

    async fn get_departments(&self) -> DriverResult<IndexMap<String, String>> {
        Err(DriverError::Unsupported(Method::GetDepartments))
    }

    async fn find_reserves(
        &self,
        _course: &str,
        _instructor: &str,
        _department: &str,
    ) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::FindReserves))
    }

    /// `Ok(None)` on bad credentials
    async fn patron_login(&self, _username: &str, _password: &str) -> DriverResult<Option<Patron>> {
        Err(DriverError::Unsupported(Method::PatronLogin))
    }

    async fn get_my_profile(&self, _patron: &Patron) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::GetMyProfile))
    }

    async fn get_my_transactions(&self, _patron: &Patron) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetMyTransactions))
    }

    async fn get_my_transaction_history(
        &self,
        _patron: &Patron,
        _params: &Value,
    ) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::GetMyTransactionHistory))
    }

    async fn get_my_holds(&self, _patron: &Patron) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetMyHolds))
    }

    async fn get_my_fines(&self, _patron: &Patron) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetMyFines))
    }

    async fn get_my_storage_retrieval_requests(&self, _patron: &Patron) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetMyStorageRetrievalRequests))
    }

    async fn get_my_ill_requests(&self, _patron: &Patron) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetMyIllRequests))
    }

    async fn get_renew_details(&self, _checkout: &Value) -> DriverResult<String> {
        Err(DriverError::Unsupported(Method::GetRenewDetails))
    }

    /// Result is keyed by item
    async fn renew_my_items(&self, _details: &RenewDetails) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::RenewMyItems))
    }

    async fn check_request_is_valid(
        &self,
        _id: &str,
        _data: &Value,
        _patron: &Patron,
    ) -> DriverResult<RequestValidity> {
        Err(DriverError::Unsupported(Method::CheckRequestIsValid))
    }

    async fn check_storage_retrieval_request_is_valid(
        &self,
        _id: &str,
        _data: &Value,
        _patron: &Patron,
    ) -> DriverResult<RequestValidity> {
        Err(DriverError::Unsupported(Method::CheckStorageRetrievalRequestIsValid))
    }

    async fn check_ill_request_is_valid(
        &self,
        _id: &str,
        _data: &Value,
        _patron: &Patron,
    ) -> DriverResult<RequestValidity> {
        Err(DriverError::Unsupported(Method::CheckIllRequestIsValid))
    }

    async fn get_pick_up_locations(
        &self,
        _patron: Option<&Patron>,
        _hold_details: Option<&Value>,
    ) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetPickUpLocations))
    }

    async fn get_default_pick_up_location(
        &self,
        _patron: Option<&Patron>,
        _hold_details: Option<&Value>,
    ) -> DriverResult<Option<String>> {
        Err(DriverError::Unsupported(Method::GetDefaultPickUpLocation))
    }

    async fn get_request_groups(
        &self,
        _id: &str,
        _patron: &Patron,
        _hold_details: Option<&Value>,
    ) -> DriverResult<Vec<Value>> {
        Err(DriverError::Unsupported(Method::GetRequestGroups))
    }

    async fn get_default_request_group(
        &self,
        _patron: &Patron,
        _hold_details: Option<&Value>,
    ) -> DriverResult<Option<String>> {
        Err(DriverError::Unsupported(Method::GetDefaultRequestGroup))
    }

    async fn place_hold(&self, _details: &RequestDetails) -> DriverResult<ActionResult> {
        Err(DriverError::Unsupported(Method::PlaceHold))
    }

    async fn cancel_holds(&self, _details: &CancelDetails) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::CancelHolds))
    }

    async fn get_cancel_hold_details(
        &self,
        _hold: &Value,
        _patron: Option<&Patron>,
    ) -> DriverResult<String> {
        Err(DriverError::Unsupported(Method::GetCancelHoldDetails))
    }

    async fn place_storage_retrieval_request(
        &self,
        _details: &RequestDetails,
    ) -> DriverResult<ActionResult> {
        Err(DriverError::Unsupported(Method::PlaceStorageRetrievalRequest))
    }

    async fn cancel_storage_retrieval_requests(&self, _details: &CancelDetails) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::CancelStorageRetrievalRequests))
    }

    async fn get_cancel_storage_retrieval_request_details(
        &self,
        _details: &Value,
        _patron: &Patron,
    ) -> DriverResult<String> {
        Err(DriverError::Unsupported(Method::GetCancelStorageRetrievalRequestDetails))
    }

    /// `Ok(None)` when ILL requests are not allowed for the record
    async fn get_ill_pickup_libraries(
        &self,
        _id: &str,
        _patron: &Patron,
    ) -> DriverResult<Option<Vec<Value>>> {
        Err(DriverError::Unsupported(Method::GetIllPickupLibraries))
    }

    async fn get_ill_pickup_locations(
        &self,
        _id: &str,
        _pickup_library: &str,
        _patron: &Patron,
    ) -> DriverResult<Option<Vec<Value>>> {
        Err(DriverError::Unsupported(Method::GetIllPickupLocations))
    }

    async fn place_ill_request(&self, _details: &RequestDetails) -> DriverResult<ActionResult> {
        Err(DriverError::Unsupported(Method::PlaceIllRequest))
    }

    async fn cancel_ill_requests(&self, _details: &CancelDetails) -> DriverResult<Value> {
        Err(DriverError::Unsupported(Method::CancelIllRequests))
    }

    async fn get_cancel_ill_request_details(
        &self,
        _details: &Value,
        _patron: &Patron,
    ) -> DriverResult<String> {
        Err(DriverError::Unsupported(Method::GetCancelIllRequestDetails))
    }

    async fn change_password(&self, _details: &PasswordChange) -> DriverResult<ActionResult> {
        Err(DriverError::Unsupported(Method::ChangePassword))
    }

    /// Empty when the patron has no blocks
    async fn get_request_blocks(&self, _patron: &Patron) -> DriverResult<Vec<String>> {
        Err(DriverError::Unsupported(Method::GetRequestBlocks))
    }

    async fn get_account_blocks(&self, _patron: &Patron) -> DriverResult<Vec<String>> {
        Err(DriverError::Unsupported(Method::GetAccountBlocks))
    }

    /// Settings of an optional feature, `None` when it is disabled
    async fn get_config(&self, _function: &str, _params: &Value) -> DriverResult<Option<Value>> {
        Err(DriverError::Unsupported(Method::GetConfig))
    }
}
