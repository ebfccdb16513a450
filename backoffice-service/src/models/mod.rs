//! Data models for backoffice-service.

mod accommodation;
mod detail;
mod excursion;
mod invoice;
mod lookups;
mod product;

pub use accommodation::Accommodation;
pub use detail::{CreateInvoiceDetail, DetailRef, InvoiceDetail};
pub use excursion::Excursion;
pub use invoice::{CreateInvoice, Invoice, InvoiceKind, UpdateInvoice};
pub use lookups::{InvoiceType, TaxeType, User};
pub use product::Product;
