mod vehicle;

pub use vehicle::VehicleRecord;
