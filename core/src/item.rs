//! The `Item` aggregate and its value objects.
//!
//! An [`Item`] is one stack of fungible units owned by one party. Parts of the
//! stack can be reserved by trades through [`ItemLock`]s. The aggregate enforces
//! a single invariant at every observable point:
//!
//! ```text
//! sum(locks[].quantity) <= total_quantity
//! ```
//!
//! Operations that would break it fail with a [`CapacityError`]; nothing is
//! clamped.
//!
//! All operations here are pure. Time is passed in by the caller (see
//! [`Clock`](crate::environment::Clock)) so that tests stay deterministic.

use crate::error::{CapacityError, DomainError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Minimum number of characters in an item name, after trimming.
pub const MIN_NAME_LENGTH: usize = 3;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier of an item stack.
///
/// # Validation
///
/// - `FromStr::from_str()`: rejects empty or whitespace-only input
/// - `new()` / `From`: no validation (trusted input, e.g. rows read back from storage)
///
/// [`Item::new`] rejects empty ids regardless of how they were built.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(String);

impl ItemId {
    /// Create a new `ItemId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Convert the id into its inner `String`.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ItemId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::validation("item id cannot be empty"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl AsRef<str> for ItemId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Identifier of the party owning an item (resolved by the front door).
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create a new `OwnerId` from a string.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OwnerId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().is_empty() {
            return Err(DomainError::validation("owner id cannot be empty"));
        }
        Ok(Self(s.to_string()))
    }
}

impl From<String> for OwnerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for OwnerId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Optimistic concurrency version of a stored item.
///
/// Fresh items start at 0. Every successful persisted update increments the
/// stored version by exactly one; writes carrying a stale version are rejected.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Version(u64);

impl Version {
    /// Create a version from its raw value.
    #[must_use]
    pub const fn new(version: u64) -> Self {
        Self(version)
    }

    /// Get the raw version number.
    #[must_use]
    pub const fn value(self) -> u64 {
        self.0
    }

    /// The version a successful write produces.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0.saturating_add(1))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value objects
// ============================================================================

/// A strictly positive number of fungible units.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ItemQuantity(u64);

impl ItemQuantity {
    /// Validate a quantity coming from a request.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if `value <= 0`.
    pub fn new(value: i64) -> Result<Self, DomainError> {
        u64::try_from(value)
            .ok()
            .filter(|units| *units > 0)
            .map(Self)
            .ok_or_else(|| {
                DomainError::validation(format!("quantity must be greater than zero, got {value}"))
            })
    }

    /// Validate an unsigned quantity (storage rows, arithmetic results).
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if `units == 0`.
    pub fn from_units(units: u64) -> Result<Self, DomainError> {
        if units == 0 {
            return Err(DomainError::validation("quantity must be greater than zero, got 0"));
        }
        Ok(Self(units))
    }

    /// Number of units.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ItemQuantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Item name: trimmed, at least [`MIN_NAME_LENGTH`] characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemName(String);

impl ItemName {
    /// Trim and validate a raw name.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if the trimmed name is shorter than
    /// [`MIN_NAME_LENGTH`] characters.
    pub fn new(raw: &str) -> Result<Self, DomainError> {
        let trimmed = raw.trim();
        if trimmed.chars().count() < MIN_NAME_LENGTH {
            return Err(DomainError::validation(format!(
                "item name must have at least {MIN_NAME_LENGTH} characters, got {trimmed:?}"
            )));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Free-form description, never empty once constructed.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemDescription(String);

impl ItemDescription {
    /// Normalize an optional raw description.
    ///
    /// Absent, empty and whitespace-only input all mean "no description".
    #[must_use]
    pub fn parse(raw: Option<&str>) -> Option<Self> {
        raw.map(str::trim)
            .filter(|trimmed| !trimmed.is_empty())
            .map(|trimmed| Self(trimmed.to_string()))
    }

    /// Get the description as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A quantity of a stack reserved by one trade/process.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ItemLock {
    locked_by: String,
    quantity: ItemQuantity,
}

impl ItemLock {
    /// Identifier of the trade/process holding the lock.
    #[must_use]
    pub fn locked_by(&self) -> &str {
        &self.locked_by
    }

    /// Reserved quantity.
    #[must_use]
    pub const fn quantity(&self) -> ItemQuantity {
        self.quantity
    }
}

/// Dispatch status of an item.
///
/// Every mutation leaves the item in one of the `Pending*` states; the matching
/// dispatch worker announces it and moves it back to `Available`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ItemStatus {
    /// Settled: every change to this item has been announced.
    Available,
    /// Created, "items created" event not yet published.
    PendingCreateDispatch,
    /// Updated or traded, "items updated" event not yet published.
    PendingUpdateDispatch,
    /// Locked, "items lock completed" event not yet published.
    PendingLockDispatch,
}

impl ItemStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 4] = [
        Self::Available,
        Self::PendingCreateDispatch,
        Self::PendingUpdateDispatch,
        Self::PendingLockDispatch,
    ];

    /// Convert status to its storage string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "Available",
            Self::PendingCreateDispatch => "PendingCreateDispatch",
            Self::PendingUpdateDispatch => "PendingUpdateDispatch",
            Self::PendingLockDispatch => "PendingLockDispatch",
        }
    }

    /// Parse status from its storage string.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if the string doesn't match a known status.
    pub fn parse(s: &str) -> Result<Self, DomainError> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown item status: {s}")))
    }

    /// Whether the item still waits for an announcement.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        !matches!(self, Self::Available)
    }
}

impl fmt::Display for ItemStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ItemStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// What is left of a stack after a trade took units out of it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Remainder {
    /// Units remain; the item must be persisted as updated.
    Kept,
    /// Nothing remains; the item must be deleted.
    ///
    /// The in-memory item keeps its previous total because a stack can't hold
    /// zero units.
    Exhausted,
}

// ============================================================================
// Aggregate
// ============================================================================

/// A stack of fungible units owned by one party, with its reservations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Item {
    id: ItemId,
    owner_id: OwnerId,
    name: ItemName,
    description: Option<ItemDescription>,
    total_quantity: ItemQuantity,
    locks: Vec<ItemLock>,
    status: ItemStatus,
    version: Version,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Item {
    /// Construct a new, unlocked item.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if `id` or `owner_id` is empty, the
    /// trimmed name is too short, or `quantity <= 0`.
    pub fn new(
        id: ItemId,
        owner_id: OwnerId,
        name: &str,
        description: Option<&str>,
        quantity: i64,
        status: ItemStatus,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        if id.as_str().trim().is_empty() {
            return Err(DomainError::validation("item id cannot be empty"));
        }
        if owner_id.as_str().trim().is_empty() {
            return Err(DomainError::validation("owner id cannot be empty"));
        }

        Ok(Self {
            id,
            owner_id,
            name: ItemName::new(name)?,
            description: ItemDescription::parse(description),
            total_quantity: ItemQuantity::new(quantity)?,
            locks: Vec::new(),
            status,
            version: Version::default(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Replace name, description and total quantity.
    ///
    /// All three are validated before anything changes, so a failed update
    /// leaves the item untouched. On success the status becomes
    /// [`ItemStatus::PendingUpdateDispatch`].
    ///
    /// # Errors
    ///
    /// - [`DomainError::Validation`] for a short name or a non-positive quantity
    /// - [`CapacityError::BelowLocked`] if the new quantity is less than the locked sum
    pub fn update(
        &mut self,
        name: &str,
        description: Option<&str>,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let name = ItemName::new(name)?;
        let quantity = ItemQuantity::new(quantity)?;
        let locked = self.locked_quantity();

        if quantity.get() < locked {
            return Err(CapacityError::BelowLocked {
                item_id: self.id.clone(),
                quantity: quantity.get(),
                locked,
            }
            .into());
        }

        self.name = name;
        self.description = ItemDescription::parse(description);
        self.total_quantity = quantity;
        self.status = ItemStatus::PendingUpdateDispatch;
        self.updated_at = now;
        Ok(())
    }

    /// Reserve `quantity` units for `locked_by`.
    ///
    /// On success a lock is appended, [`Self::locked_quantity`] grows by exactly
    /// `quantity`, the total is unchanged and the status becomes
    /// [`ItemStatus::PendingLockDispatch`].
    ///
    /// # Errors
    ///
    /// - [`DomainError::Validation`] if `quantity <= 0` or `locked_by` is empty
    /// - [`CapacityError::InsufficientAvailable`] if `locked + quantity > total`
    pub fn lock(
        &mut self,
        locked_by: &str,
        quantity: i64,
        now: DateTime<Utc>,
    ) -> Result<(), DomainError> {
        let quantity = ItemQuantity::new(quantity)?;
        if locked_by.trim().is_empty() {
            return Err(DomainError::validation("lock owner cannot be empty"));
        }

        let available = self.available_quantity();
        if quantity.get() > available {
            return Err(CapacityError::InsufficientAvailable {
                item_id: self.id.clone(),
                requested: quantity.get(),
                available,
            }
            .into());
        }

        self.locks.push(ItemLock {
            locked_by: locked_by.to_string(),
            quantity,
        });
        self.status = ItemStatus::PendingLockDispatch;
        self.updated_at = now;
        Ok(())
    }

    /// Sum of all lock quantities. O(number of locks).
    #[must_use]
    pub fn locked_quantity(&self) -> u64 {
        self.locks.iter().map(|lock| lock.quantity.get()).sum()
    }

    /// Units not covered by any lock.
    #[must_use]
    pub fn available_quantity(&self) -> u64 {
        self.total_quantity.get().saturating_sub(self.locked_quantity())
    }

    /// Unconditional status transition (used by dispatch workers).
    pub fn update_status(&mut self, status: ItemStatus, now: DateTime<Utc>) {
        self.status = status;
        self.updated_at = now;
    }

    /// Consume the lock held by `locked_by` and debit its quantity from the total.
    ///
    /// Returns the settled quantity (taken from the stored lock, not from any
    /// request) and what is left of the stack.
    ///
    /// # Errors
    ///
    /// Returns [`DomainError::Validation`] if no lock is held by `locked_by`.
    pub fn settle_lock(
        &mut self,
        locked_by: &str,
        now: DateTime<Utc>,
    ) -> Result<(ItemQuantity, Remainder), DomainError> {
        let position = self
            .locks
            .iter()
            .position(|lock| lock.locked_by == locked_by)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "item {} has no lock held by {locked_by}",
                    self.id
                ))
            })?;

        let settled = self.locks.remove(position).quantity;
        let remaining = self.total_quantity.get().saturating_sub(settled.get());
        Ok((settled, self.shrink_to(remaining, now)))
    }

    /// Take `quantity` unlocked units out of the stack (wanted side of a trade).
    ///
    /// # Errors
    ///
    /// - [`DomainError::Validation`] if `quantity` exceeds the total
    /// - [`CapacityError::BelowLocked`] if the remainder would not cover the locks
    pub fn debit(
        &mut self,
        quantity: ItemQuantity,
        now: DateTime<Utc>,
    ) -> Result<Remainder, DomainError> {
        let total = self.total_quantity.get();
        if quantity.get() > total {
            return Err(DomainError::validation(format!(
                "requested {quantity} units of item {} which only holds {total}",
                self.id
            )));
        }

        let remaining = total - quantity.get();
        let locked = self.locked_quantity();
        if remaining < locked {
            return Err(CapacityError::BelowLocked {
                item_id: self.id.clone(),
                quantity: remaining,
                locked,
            }
            .into());
        }

        Ok(self.shrink_to(remaining, now))
    }

    fn shrink_to(&mut self, remaining: u64, now: DateTime<Utc>) -> Remainder {
        self.status = ItemStatus::PendingUpdateDispatch;
        self.updated_at = now;
        match ItemQuantity::from_units(remaining) {
            Ok(quantity) => {
                self.total_quantity = quantity;
                Remainder::Kept
            }
            Err(_) => Remainder::Exhausted,
        }
    }

    /// Mint a new stack for `owner_id` carrying this item's name and description.
    ///
    /// Minted items start unlocked in [`ItemStatus::PendingUpdateDispatch`].
    #[must_use]
    pub fn mint(
        &self,
        id: ItemId,
        owner_id: OwnerId,
        quantity: ItemQuantity,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            owner_id,
            name: self.name.clone(),
            description: self.description.clone(),
            total_quantity: quantity,
            locks: Vec::new(),
            status: ItemStatus::PendingUpdateDispatch,
            version: Version::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replace the version (storage implementations only).
    #[must_use]
    pub const fn with_version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// The lock held by `locked_by`, if any.
    #[must_use]
    pub fn lock_held_by(&self, locked_by: &str) -> Option<&ItemLock> {
        self.locks.iter().find(|lock| lock.locked_by == locked_by)
    }

    /// Item id.
    #[must_use]
    pub const fn id(&self) -> &ItemId {
        &self.id
    }

    /// Owner id.
    #[must_use]
    pub const fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    /// Name.
    #[must_use]
    pub const fn name(&self) -> &ItemName {
        &self.name
    }

    /// Description, if any.
    #[must_use]
    pub const fn description(&self) -> Option<&ItemDescription> {
        self.description.as_ref()
    }

    /// Total units in the stack, locked or not.
    #[must_use]
    pub const fn total_quantity(&self) -> ItemQuantity {
        self.total_quantity
    }

    /// Locks in insertion order.
    #[must_use]
    pub fn locks(&self) -> &[ItemLock] {
        &self.locks
    }

    /// Dispatch status.
    #[must_use]
    pub const fn status(&self) -> ItemStatus {
        self.status
    }

    /// Version last read from (or written to) storage.
    #[must_use]
    pub const fn version(&self) -> Version {
        self.version
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Time of the last mutation or status transition.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// ============================================================================
// Persistence shape
// ============================================================================

/// A lock as stored by storage implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockRecord {
    /// Trade/process holding the lock
    pub locked_by: String,
    /// Reserved units
    pub quantity: u64,
}

/// Flat, primitive-typed copy of an [`Item`] for storage implementations.
///
/// Converting back with [`TryFrom`] re-validates every field and the lock
/// invariant, so corrupt rows never become aggregates.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Item id
    pub id: String,
    /// Owner id
    pub owner_id: String,
    /// Trimmed name
    pub name: String,
    /// Optional description
    pub description: Option<String>,
    /// Total units
    pub total_quantity: u64,
    /// Locks in insertion order
    pub locks: Vec<LockRecord>,
    /// Status string (see [`ItemStatus::as_str`])
    pub status: String,
    /// Optimistic concurrency version
    pub version: u64,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

impl From<&Item> for ItemRecord {
    fn from(item: &Item) -> Self {
        Self {
            id: item.id.as_str().to_string(),
            owner_id: item.owner_id.as_str().to_string(),
            name: item.name.as_str().to_string(),
            description: item.description.as_ref().map(|d| d.as_str().to_string()),
            total_quantity: item.total_quantity.get(),
            locks: item
                .locks
                .iter()
                .map(|lock| LockRecord {
                    locked_by: lock.locked_by.clone(),
                    quantity: lock.quantity.get(),
                })
                .collect(),
            status: item.status.as_str().to_string(),
            version: item.version.value(),
            created_at: item.created_at,
            updated_at: item.updated_at,
        }
    }
}

impl TryFrom<ItemRecord> for Item {
    type Error = DomainError;

    fn try_from(record: ItemRecord) -> Result<Self, Self::Error> {
        let id: ItemId = record.id.parse()?;
        let owner_id: OwnerId = record.owner_id.parse()?;
        let total_quantity = ItemQuantity::from_units(record.total_quantity)?;

        let locks = record
            .locks
            .into_iter()
            .map(|lock| {
                Ok(ItemLock {
                    locked_by: lock.locked_by,
                    quantity: ItemQuantity::from_units(lock.quantity)?,
                })
            })
            .collect::<Result<Vec<_>, DomainError>>()?;

        let locked: u64 = locks.iter().map(|lock| lock.quantity.get()).sum();
        if locked > total_quantity.get() {
            return Err(CapacityError::BelowLocked {
                item_id: id,
                quantity: total_quantity.get(),
                locked,
            }
            .into());
        }

        Ok(Self {
            id,
            owner_id,
            name: ItemName::new(&record.name)?,
            description: ItemDescription::parse(record.description.as_deref()),
            total_quantity,
            locks,
            status: ItemStatus::parse(&record.status)?,
            version: Version::new(record.version),
            created_at: record.created_at,
            updated_at: record.updated_at,
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn t1() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 5, 0).unwrap()
    }

    fn item(quantity: i64) -> Item {
        Item::new(
            ItemId::new("item-1"),
            OwnerId::new("alice"),
            "Iron Sword",
            Some("  sharp  "),
            quantity,
            ItemStatus::PendingCreateDispatch,
            t0(),
        )
        .expect("valid item")
    }

    #[test]
    fn new_item_trims_name_and_description() {
        let item = Item::new(
            ItemId::new("item-1"),
            OwnerId::new("alice"),
            "   Iron Sword \t",
            Some("  sharp  "),
            5,
            ItemStatus::PendingCreateDispatch,
            t0(),
        )
        .unwrap();

        assert_eq!(item.name().as_str(), "Iron Sword");
        assert_eq!(item.description().unwrap().as_str(), "sharp");
        assert_eq!(item.total_quantity().get(), 5);
        assert_eq!(item.locked_quantity(), 0);
        assert_eq!(item.version(), Version::new(0));
        assert_eq!(item.status(), ItemStatus::PendingCreateDispatch);
    }

    #[test]
    fn blank_description_means_none() {
        assert_eq!(ItemDescription::parse(Some("   ")), None);
        assert_eq!(ItemDescription::parse(Some("")), None);
        assert_eq!(ItemDescription::parse(None), None);
    }

    #[test]
    fn new_item_rejects_invalid_input() {
        let build = |id: &str, owner: &str, name: &str, quantity: i64| {
            Item::new(
                ItemId::new(id),
                OwnerId::new(owner),
                name,
                None,
                quantity,
                ItemStatus::Available,
                t0(),
            )
        };

        assert!(matches!(build("", "alice", "Sword", 1), Err(DomainError::Validation(_))));
        assert!(matches!(build("id", " ", "Sword", 1), Err(DomainError::Validation(_))));
        assert!(matches!(build("id", "alice", "  x  ", 1), Err(DomainError::Validation(_))));
        assert!(matches!(build("id", "alice", "Sword", 0), Err(DomainError::Validation(_))));
        assert!(matches!(build("id", "alice", "Sword", -4), Err(DomainError::Validation(_))));
    }

    #[test]
    fn lock_reserves_quantity_and_marks_pending() {
        let mut item = item(5);
        item.lock("trade-1", 3, t1()).unwrap();

        assert_eq!(item.locked_quantity(), 3);
        assert_eq!(item.available_quantity(), 2);
        assert_eq!(item.total_quantity().get(), 5);
        assert_eq!(item.status(), ItemStatus::PendingLockDispatch);
        assert_eq!(item.updated_at(), t1());
        assert_eq!(item.locks()[0].locked_by(), "trade-1");
    }

    #[test]
    fn lock_over_capacity_fails_and_changes_nothing() {
        let mut item = item(5);
        item.lock("trade-1", 3, t1()).unwrap();
        let before = item.clone();

        let err = item.lock("trade-2", 3, t1()).unwrap_err();

        assert_eq!(
            err,
            DomainError::Capacity(CapacityError::InsufficientAvailable {
                item_id: ItemId::new("item-1"),
                requested: 3,
                available: 2,
            })
        );
        assert_eq!(item, before);
        assert_eq!(item.locked_quantity(), 3);
    }

    #[test]
    fn lock_requires_positive_quantity_and_owner() {
        let mut item = item(5);
        assert!(matches!(item.lock("trade-1", 0, t1()), Err(DomainError::Validation(_))));
        assert!(matches!(item.lock("", 1, t1()), Err(DomainError::Validation(_))));
        assert!(item.locks().is_empty());
    }

    #[test]
    fn update_cannot_shrink_below_locked() {
        let mut item = item(5);
        item.lock("trade-1", 4, t1()).unwrap();

        let err = item.update("Iron Sword", None, 3, t1()).unwrap_err();
        assert!(matches!(
            err,
            DomainError::Capacity(CapacityError::BelowLocked { quantity: 3, locked: 4, .. })
        ));
        assert_eq!(item.total_quantity().get(), 5);

        item.update("  Steel Sword ", Some(""), 4, t1()).unwrap();
        assert_eq!(item.name().as_str(), "Steel Sword");
        assert_eq!(item.description(), None);
        assert_eq!(item.total_quantity().get(), 4);
        assert_eq!(item.status(), ItemStatus::PendingUpdateDispatch);
    }

    #[test]
    fn settle_lock_consumes_only_the_matching_lock() {
        let mut item = item(10);
        item.lock("trade-1", 4, t0()).unwrap();
        item.lock("trade-2", 3, t0()).unwrap();

        let (settled, remainder) = item.settle_lock("trade-1", t1()).unwrap();

        assert_eq!(settled.get(), 4);
        assert_eq!(remainder, Remainder::Kept);
        assert_eq!(item.total_quantity().get(), 6);
        assert_eq!(item.locked_quantity(), 3);
        assert!(item.lock_held_by("trade-1").is_none());
        assert_eq!(item.status(), ItemStatus::PendingUpdateDispatch);
    }

    #[test]
    fn settle_lock_of_whole_stack_exhausts_it() {
        let mut item = item(5);
        item.lock("trade-1", 5, t0()).unwrap();

        let (settled, remainder) = item.settle_lock("trade-1", t1()).unwrap();

        assert_eq!(settled.get(), 5);
        assert_eq!(remainder, Remainder::Exhausted);
    }

    #[test]
    fn settle_lock_without_lock_is_a_validation_error() {
        let mut item = item(5);
        let before = item.clone();
        assert!(matches!(
            item.settle_lock("trade-404", t1()),
            Err(DomainError::Validation(_))
        ));
        assert_eq!(item, before);
    }

    #[test]
    fn debit_respects_total_and_locks() {
        let mut item = item(5);
        item.lock("trade-1", 2, t0()).unwrap();

        let too_much = ItemQuantity::new(6).unwrap();
        assert!(matches!(item.debit(too_much, t1()), Err(DomainError::Validation(_))));

        let eats_locks = ItemQuantity::new(4).unwrap();
        assert!(matches!(
            item.debit(eats_locks, t1()),
            Err(DomainError::Capacity(CapacityError::BelowLocked { .. }))
        ));

        let fits = ItemQuantity::new(3).unwrap();
        assert_eq!(item.debit(fits, t1()).unwrap(), Remainder::Kept);
        assert_eq!(item.total_quantity().get(), 2);
    }

    #[test]
    fn mint_copies_name_and_description_for_new_owner() {
        let source = item(5);
        let minted = source.mint(
            ItemId::new("item-2"),
            OwnerId::new("bob"),
            ItemQuantity::new(2).unwrap(),
            t1(),
        );

        assert_eq!(minted.owner_id().as_str(), "bob");
        assert_eq!(minted.name(), source.name());
        assert_eq!(minted.description(), source.description());
        assert_eq!(minted.total_quantity().get(), 2);
        assert_eq!(minted.status(), ItemStatus::PendingUpdateDispatch);
        assert!(minted.locks().is_empty());
    }

    #[test]
    fn record_with_overcommitted_locks_is_rejected() {
        let mut record = ItemRecord::from(&item(5));
        record.locks.push(LockRecord {
            locked_by: "trade-1".to_string(),
            quantity: 6,
        });

        assert!(matches!(
            Item::try_from(record),
            Err(DomainError::Capacity(CapacityError::BelowLocked { locked: 6, .. }))
        ));
    }

    #[test]
    fn status_strings_are_stable() {
        for status in ItemStatus::ALL {
            assert_eq!(ItemStatus::parse(status.as_str()).unwrap(), status);
        }
        assert!(ItemStatus::parse("Locked").is_err());
        assert!(!ItemStatus::Available.is_pending());
        assert!(ItemStatus::PendingLockDispatch.is_pending());
    }
}
