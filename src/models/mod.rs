// Domain models: raw OS reads, stored samples, aggregated buckets

mod aggregation;
mod sample;
mod snapshot;

pub use aggregation::{AggregatedPoint, DeviceAggregate, DiskAggregate, InterfaceAggregate, Stat};
pub use sample::{
    DerivedRates, DeviceRate, DeviceSample, DiskUsage, InterfaceRate, InterfaceSample, Sample,
};
pub use snapshot::{
    DeviceReading, InterfaceReading, IoCounters, MountReading, NetCounters, RawSnapshot,
    SpaceUsage,
};

/// A time-ordered run of stored samples, shared with the store (no copies of sample data).
pub type Series = Vec<std::sync::Arc<Sample>>;
