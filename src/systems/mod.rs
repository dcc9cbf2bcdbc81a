mod bookkeeping;
mod growth;
mod mortality;
mod planting;
mod sales;

pub use bookkeeping::BookkeepingSystem;
pub use growth::GrowthSystem;
pub use mortality::MortalitySystem;
pub use planting::PlantingSystem;
pub use sales::SalesSystem;
