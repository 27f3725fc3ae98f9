// Gas attached to the wallet's own contract calls, in gas units (1 Tgas = 1e12).

/// Gas for the device-link registration call.
pub const LINK_DEVICE_REGISTRATION_GAS: u64 = 120_000_000_000_000;
