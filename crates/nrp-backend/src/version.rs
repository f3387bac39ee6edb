// SPDX-License-Identifier: Apache-2.0

//! `GET /version` (spec §6): `{ componentName: version, ... }` for every
//! crate that makes up this deployment.

use serde_json::{json, Value};

pub fn versions() -> Value {
    json!({
        "nrp-backend": env!("CARGO_PKG_VERSION"),
        "nrp-core": env!("CARGO_PKG_VERSION"),
        "nrp-registry": env!("CARGO_PKG_VERSION"),
        "nrp-storage": env!("CARGO_PKG_VERSION"),
        "nrp-supervisor": env!("CARGO_PKG_VERSION"),
        "nrp-sync": env!("CARGO_PKG_VERSION"),
    })
}
