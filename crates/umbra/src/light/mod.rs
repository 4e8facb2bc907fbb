mod catalog;
mod region;
mod resolver;

pub use catalog::{LightCatalog, LightOrigin, LightSource};
pub use region::{point_in_region, restricting_region, Region, RegionId, RegionShape, RegionSource};
pub use resolver::{
    classify, probe_for, resolve_level, LightLevel, Resolution, ResolveError, ResolveOptions,
};
