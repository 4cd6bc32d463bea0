#![allow(dead_code)]

use irradiance_core::config::MapResolution;
use irradiance_core::{IrradianceTransfer, PrimaryAreaLight, TransferConfig};
use nalgebra::{Matrix4, Vector3};

/// Light hovering 2 units above the floor, facing down.
pub fn overhead_light() -> PrimaryAreaLight {
    light_at(Vector3::new(0.0, 0.0, 2.0))
}

/// Downward-facing light at `position`.
pub fn light_at(position: Vector3<f64>) -> PrimaryAreaLight {
    PrimaryAreaLight::new(Matrix4::new_translation(&position), -Vector3::z())
}

/// Transfer with a 90° camera, so the map resolution alone sets pixel size.
pub fn transfer(resolution: MapResolution) -> IrradianceTransfer {
    transfer_with(TransferConfig::builder().resolution(resolution))
}

/// Transfer from a builder, forcing the 90° camera used by the scenes.
pub fn transfer_with(builder: irradiance_core::config::TransferConfigBuilder) -> IrradianceTransfer {
    IrradianceTransfer::with_config(builder.camera_fov_deg(90.0).build())
}
