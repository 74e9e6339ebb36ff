#![allow(dead_code)]

use loam::{ColumnKind, Entity, EntityManager, FieldSpec, Shared};
use loam_memory::MemoryDriver;
use rust_decimal::Decimal;
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct Address {
    pub id: i32,
    pub street: String,
    pub city: String,
}

impl Default for Address {
    fn default() -> Self {
        Self {
            id: -1,
            street: String::new(),
            city: String::new(),
        }
    }
}

impl Entity for Address {
    fn entity_name() -> &'static str {
        "Address"
    }

    fn table() -> &'static str {
        "Addresses"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int32)
                .identifier()
                .with(|e: &Address| e.id, |e, v| e.id = v),
            FieldSpec::new("street")
                .column("Street", ColumnKind::String)
                .not_null()
                .with(|e: &Address| e.street.clone(), |e, v| e.street = v),
            FieldSpec::new("city")
                .column("City", ColumnKind::String)
                .with(|e: &Address| e.city.clone(), |e, v| e.city = v),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Customer {
    pub id: i32,
    pub name: String,
    pub email: Option<String>,
    pub status: String,
    pub balance: Decimal,
    pub address: Option<Shared<Address>>,
    pub orders: Vec<Shared<Order>>,
    pub nickname: Option<String>,
    pub priority: Option<i32>,
}

impl Default for Customer {
    fn default() -> Self {
        Self {
            id: -1,
            name: String::new(),
            email: None,
            status: String::new(),
            balance: Decimal::ZERO,
            address: None,
            orders: Vec::new(),
            nickname: None,
            priority: None,
        }
    }
}

impl Entity for Customer {
    fn entity_name() -> &'static str {
        "Customer"
    }

    fn table() -> &'static str {
        "Customers"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int32)
                .identifier()
                .with(|e: &Customer| e.id, |e, v| e.id = v),
            FieldSpec::new("name")
                .column("Name", ColumnKind::String)
                .not_null()
                .with(|e: &Customer| e.name.clone(), |e, v| e.name = v),
            FieldSpec::new("email")
                .column("Email", ColumnKind::String)
                .unique()
                .with(|e: &Customer| e.email.clone(), |e, v| e.email = v),
            FieldSpec::new("status")
                .column("Status", ColumnKind::String)
                .with(|e: &Customer| e.status.clone(), |e, v| e.status = v),
            FieldSpec::new("balance")
                .column("Balance", ColumnKind::Money)
                .with(|e: &Customer| e.balance, |e, v| e.balance = v),
            FieldSpec::new("address").column("AddressId", ColumnKind::Int32).many_to_one::<Address>(
                "Id",
                |e: &Customer| e.address.clone(),
                |e, v| e.address = v,
            ),
            FieldSpec::new("orders")
                .one_to_many::<Order>("CustomerId", |e: &mut Customer, v| e.orders = v),
            FieldSpec::new("nickname")
                .custom("CustomerFields", 1, "CustomerId", ColumnKind::String)
                .with(|e: &Customer| e.nickname.clone(), |e, v| e.nickname = v),
            FieldSpec::new("priority")
                .custom("CustomerFields", 2, "CustomerId", ColumnKind::Int32)
                .with(|e: &Customer| e.priority, |e, v| e.priority = v),
        ]
    }
}

#[derive(Debug, Clone)]
pub struct Order {
    pub id: i32,
    pub reference: String,
    pub total: Decimal,
    pub customer: Option<Shared<Customer>>,
}

impl Default for Order {
    fn default() -> Self {
        Self {
            id: -1,
            reference: String::new(),
            total: Decimal::ZERO,
            customer: None,
        }
    }
}

impl Entity for Order {
    fn entity_name() -> &'static str {
        "Order"
    }

    fn table() -> &'static str {
        "Orders"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int32)
                .identifier()
                .with(|e: &Order| e.id, |e, v| e.id = v),
            FieldSpec::new("reference")
                .column("Reference", ColumnKind::String)
                .unique()
                .with(|e: &Order| e.reference.clone(), |e, v| e.reference = v),
            FieldSpec::new("total")
                .column("Total", ColumnKind::Money)
                .with(|e: &Order| e.total, |e, v| e.total = v),
            FieldSpec::new("customer").column("CustomerId", ColumnKind::Int32).many_to_one::<Customer>(
                "Id",
                |e: &Order| e.customer.clone(),
                |e, v| e.customer = v,
            ),
        ]
    }
}

/// Relates to its owner through a non-identifier join column.
#[derive(Debug, Clone)]
pub struct Badge {
    pub id: i32,
    pub label: String,
    pub owner: Option<Shared<Customer>>,
}

impl Default for Badge {
    fn default() -> Self {
        Self {
            id: -1,
            label: String::new(),
            owner: None,
        }
    }
}

impl Entity for Badge {
    fn entity_name() -> &'static str {
        "Badge"
    }

    fn table() -> &'static str {
        "Badges"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int32)
                .identifier()
                .with(|e: &Badge| e.id, |e, v| e.id = v),
            FieldSpec::new("label")
                .column("Label", ColumnKind::String)
                .with(|e: &Badge| e.label.clone(), |e, v| e.label = v),
            FieldSpec::new("owner").column("OwnerEmail", ColumnKind::String).many_to_one::<Customer>(
                "Email",
                |e: &Badge| e.owner.clone(),
                |e, v| e.owner = v,
            ),
        ]
    }
}

/// GUID-keyed: the generated identifier is recovered through the row GUID
/// after insert.
#[derive(Debug, Clone)]
pub struct Ticket {
    pub id: i32,
    pub guid: Uuid,
    pub subject: String,
}

impl Default for Ticket {
    fn default() -> Self {
        Self {
            id: -1,
            guid: Uuid::nil(),
            subject: String::new(),
        }
    }
}

impl Entity for Ticket {
    fn entity_name() -> &'static str {
        "Ticket"
    }

    fn table() -> &'static str {
        "Tickets"
    }

    fn fields() -> Vec<FieldSpec<Self>> {
        vec![
            FieldSpec::new("id")
                .column("Id", ColumnKind::Int32)
                .identifier()
                .with(|e: &Ticket| e.id, |e, v| e.id = v),
            FieldSpec::new("guid")
                .column("RowGuid", ColumnKind::Guid)
                .guid()
                .unique()
                .with(|e: &Ticket| e.guid, |e, v| e.guid = v),
            FieldSpec::new("subject")
                .column("Subject", ColumnKind::String)
                .with(|e: &Ticket| e.subject.clone(), |e, v| e.subject = v),
        ]
    }
}

pub fn memory_driver() -> Arc<MemoryDriver> {
    let _ = env_logger::builder().is_test(true).try_init();
    let driver = Arc::new(MemoryDriver::new());
    driver.define_table("Addresses", "Id");
    driver.define_table("Customers", "Id");
    driver.define_table("Orders", "Id");
    driver.define_table("Badges", "Id");
    driver.define_table("Tickets", "Id");
    driver
}

pub fn manager(driver: &Arc<MemoryDriver>) -> EntityManager {
    EntityManager::new(driver.clone())
}
