//! FichaPro Status Tool
//!
//! Runtime status plus the costing guide served to assistants.

use serde::Serialize;
use std::path::PathBuf;
use std::time::Instant;
use sysinfo::{Pid, ProcessesToUpdate, System};

use crate::build_info::BuildInfo;
use crate::costing::{DELIVERY_FEE, MAX_NESTING_DEPTH};

/// Costing instructions for AI assistants
pub const COSTING_INSTRUCTIONS: &str = r#"
# FichaPro Costing Instructions

How to register ingredients, build recipes and technical sheets, and read
the calculated costs.

## Session

Every tool except `sign_in` and `fichapro_status` needs a signed-in user.
1. `sign_in` with username and password
2. `my_roles` lists the restaurants you can work on and your role in each
3. `sign_out` ends the session

| Role | Read | Edit catalog | See costs | Edit restaurant |
|------|------|--------------|-----------|-----------------|
| administrador | yes | yes | yes | yes |
| master | yes | yes | yes | yes |
| redator | yes | yes | no | no |
| usuario_comum | yes | no | no | no |

Cost and price fields come back as `null` for roles that cannot see costs.

## Ingredients (insumos)

Register the purchase reference: `reference_weight` in the ingredient's unit
(`g`, `ml` or `un`) and the `reference_price` paid for that amount.

**Example:** 1 kg of flour for R$ 10,00
→ `reference_weight: 1000, unit: "g", reference_price: 10`
→ unit cost 0.01 per gram

## Line items

Recipes and technical sheets are lists of line items. Each item draws from
exactly one source:

```json
{"source": {"kind": "ingredient", "id": 3}, "quantity_used": 200}
{"source": {"kind": "recipe", "id": 8}, "quantity_used": 250}
```

`quantity_used` must be greater than zero when saving.

Optional adjustment fields:
- `cooking_index` (IC): whole percent from 0 to 999.99, default 100
- `edible_index` (IPC): whole percent from 0 to 999.99, default 100
- an index sent as null or 0 turns the adjustment off
- `cooking_direction`: `menos` (default) or `mais`
- `apply_adjustment`: default true

With f = (IC/100) × (IPC/100):

| Direction | Adjusted weight | Adjusted cost |
|-----------|-----------------|---------------|
| menos | quantity × f | unit_cost × quantity ÷ f |
| mais | quantity ÷ f | unit_cost × quantity × f |

An IC or IPC of 0, or `apply_adjustment: false`, leaves weight and cost
unadjusted.

**Example:** 200 g of flour (0.01/g), IC 80, IPC 90, `mais`
→ weight 200 ÷ 0.72 = 277.78 g
→ cost 2.00 × 0.72 = 1.44

## Nested recipes

A recipe item uses a share of another recipe:
share = quantity_used ÷ (sum of the nested recipe's adjusted weights)
cost = nested recipe total cost × share

A recipe can never contain itself, directly or through other recipes.
Nesting deeper than {MAX_DEPTH} levels is rejected.

## Totals and prices

- `final_weight`: sum of adjusted weights
- `total_cost`: sum of adjusted costs
- `yield_portions`: final_weight ÷ portion_size (recipes only)
- `restaurant_price`: total_cost × restaurant markup factor
- `delivery_price`: restaurant_price plus a {DELIVERY_PCT}% delivery fee

Totals are recalculated on every save. Changing an ingredient price or a
recipe updates every recipe and technical sheet that uses it.

Use `preview_recipe_costs` / `preview_technical_sheet_costs` to see the
numbers for an unsaved item list.
"#;

/// Costing instructions with the current limits filled in
pub fn costing_instructions() -> String {
    COSTING_INSTRUCTIONS
        .replace("{MAX_DEPTH}", &MAX_NESTING_DEPTH.to_string())
        .replace("{DELIVERY_PCT}", &format!("{:.0}", DELIVERY_FEE * 100.0))
}

/// Runtime status of the FichaPro service
#[derive(Debug, Clone, Serialize)]
pub struct FichaproStatus {
    /// Build information
    pub build_number: u64,
    pub build_timestamp: &'static str,
    pub build_profile: &'static str,
    pub version: &'static str,

    /// Database information
    pub database_path: String,
    pub database_size_bytes: Option<u64>,

    /// Process information
    pub uptime_seconds: u64,
    pub process_id: u32,
    pub memory_usage_bytes: u64,

    /// Signed-in user, if any
    pub signed_in_as: Option<String>,
}

/// Status tracker for collecting runtime information
pub struct StatusTracker {
    start_time: Instant,
    database_path: PathBuf,
}

impl StatusTracker {
    pub fn new(database_path: PathBuf) -> Self {
        Self {
            start_time: Instant::now(),
            database_path,
        }
    }

    /// Get the current status
    pub fn get_status(&self, signed_in_as: Option<String>) -> FichaproStatus {
        let build_info = BuildInfo::current();

        let database_size_bytes = std::fs::metadata(&self.database_path)
            .ok()
            .map(|m| m.len());

        let pid = std::process::id();
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::Some(&[Pid::from_u32(pid)]));

        let memory_usage_bytes = sys
            .process(Pid::from_u32(pid))
            .map(|p| p.memory())
            .unwrap_or(0);

        FichaproStatus {
            build_number: build_info.build_number,
            build_timestamp: build_info.build_timestamp,
            build_profile: build_info.profile,
            version: build_info.version,
            database_path: self.database_path.display().to_string(),
            database_size_bytes,
            uptime_seconds: self.start_time.elapsed().as_secs(),
            process_id: pid,
            memory_usage_bytes,
            signed_in_as,
        }
    }
}
