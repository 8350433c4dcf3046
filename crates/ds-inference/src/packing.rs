//! Packing of flat optimizer vectors into named sensitivity slots.
//!
//! A calibration routine searches over a subset of eight parameters
//! `{qb, qm, ab, am, d0b, d0m, d1b, d1m}` (`b` = base group, `m` = modifier /
//! comparison group). The free subset is marked by a positional mask; the
//! remaining slots take externally fixed values.
//!
//! Slots are filled in two passes (free values at masked positions, fixed
//! values in the rest), then the subgroup-validity collapse and the optional
//! log-odds reinterpretation of `qm` are applied.

use ds_core::{Error, Result};
use ds_prob::math::{inverse_logit, logit};
use serde::{Deserialize, Serialize};

use crate::expand::SensitivityParams;

/// Number of packed slots.
pub const N_SLOTS: usize = 8;

/// A named packed-parameter slot, in positional order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Slot {
    /// Confounder prevalence, base group.
    Qb,
    /// Confounder prevalence, modifier group.
    Qm,
    /// Treatment log-odds shift, base group.
    Ab,
    /// Treatment log-odds shift, modifier group.
    Am,
    /// Control-outcome log-odds shift, base group.
    D0b,
    /// Control-outcome log-odds shift, modifier group.
    D0m,
    /// Treated-outcome log-odds shift, base group.
    D1b,
    /// Treated-outcome log-odds shift, modifier group.
    D1m,
}

impl Slot {
    /// All slots in positional order.
    pub const ALL: [Slot; N_SLOTS] =
        [Slot::Qb, Slot::Qm, Slot::Ab, Slot::Am, Slot::D0b, Slot::D0m, Slot::D1b, Slot::D1m];

    /// 0-based position in the flat vector.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Slot name as used in output tables.
    pub fn name(self) -> &'static str {
        match self {
            Slot::Qb => "qb",
            Slot::Qm => "qm",
            Slot::Ab => "ab",
            Slot::Am => "am",
            Slot::D0b => "d0b",
            Slot::D0m => "d0m",
            Slot::D1b => "d1b",
            Slot::D1m => "d1m",
        }
    }
}

/// Options controlling [`pack`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackOptions {
    /// Positional mask of free slots (length 8). `None` means all slots are free.
    pub free_mask: Option<Vec<bool>>,
    /// Values for the non-free slots, in positional order.
    pub fixed_values: Option<Vec<f64>>,
    /// Estimate modifier slots `am`, `d0m`, `d1m` independently of their base slots.
    pub allow_subgroup_validity: bool,
    /// Interpret `qm` as a log-odds delta relative to `qb`.
    pub q_on_log_odds_range: bool,
}

/// The eight named sensitivity parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackedParameters {
    /// Confounder prevalence, base group.
    pub qb: f64,
    /// Confounder prevalence, modifier group.
    pub qm: f64,
    /// Treatment log-odds shift, base group.
    pub ab: f64,
    /// Treatment log-odds shift, modifier group.
    pub am: f64,
    /// Control-outcome log-odds shift, base group.
    pub d0b: f64,
    /// Control-outcome log-odds shift, modifier group.
    pub d0m: f64,
    /// Treated-outcome log-odds shift, base group.
    pub d1b: f64,
    /// Treated-outcome log-odds shift, modifier group.
    pub d1m: f64,
}

impl PackedParameters {
    /// Value stored in `slot`.
    pub fn get(&self, slot: Slot) -> f64 {
        match slot {
            Slot::Qb => self.qb,
            Slot::Qm => self.qm,
            Slot::Ab => self.ab,
            Slot::Am => self.am,
            Slot::D0b => self.d0b,
            Slot::D0m => self.d0m,
            Slot::D1b => self.d1b,
            Slot::D1m => self.d1m,
        }
    }

    /// Slots as a flat vector in positional order.
    pub fn to_vec(&self) -> Vec<f64> {
        Slot::ALL.iter().map(|&s| self.get(s)).collect()
    }

    /// Per-level parameters for a two-level grouping, base level first.
    pub fn to_sensitivity_params(&self) -> SensitivityParams {
        SensitivityParams::new(
            vec![self.qb, self.qm],
            vec![self.ab, self.am],
            vec![self.d0b, self.d0m],
            vec![self.d1b, self.d1m],
        )
    }
}

/// Reconstitute all eight slot values from free and fixed values.
fn fill_slots(raw: &[f64], opts: &PackOptions) -> Result<[f64; N_SLOTS]> {
    let fixed = opts.fixed_values.as_deref().unwrap_or(&[]);
    let Some(mask) = opts.free_mask.as_deref() else {
        if raw.len() != N_SLOTS {
            return Err(Error::InvalidParameterShape(format!(
                "expected {} parameters without a free mask, got {}",
                N_SLOTS,
                raw.len()
            )));
        }
        if !fixed.is_empty() {
            return Err(Error::InvalidParameterShape(
                "fixed values require a free mask".to_string(),
            ));
        }
        let mut slots = [0.0; N_SLOTS];
        slots.copy_from_slice(raw);
        return Ok(slots);
    };

    if mask.len() != N_SLOTS {
        return Err(Error::InvalidParameterShape(format!(
            "free mask must have {} entries, got {}",
            N_SLOTS,
            mask.len()
        )));
    }
    let n_free = mask.iter().filter(|&&m| m).count();
    if raw.len() != n_free {
        return Err(Error::InvalidParameterShape(format!(
            "free mask selects {} parameters, got {}",
            n_free,
            raw.len()
        )));
    }
    if fixed.len() != N_SLOTS - n_free {
        return Err(Error::InvalidParameterShape(format!(
            "free mask leaves {} fixed slots, got {} fixed values",
            N_SLOTS - n_free,
            fixed.len()
        )));
    }

    let mut slots = [None; N_SLOTS];
    let free_slots = Slot::ALL.iter().filter(|s| mask[s.index()]);
    for (slot, &v) in free_slots.zip(raw) {
        slots[slot.index()] = Some(v);
    }
    let fixed_slots = Slot::ALL.iter().filter(|s| !mask[s.index()]);
    for (slot, &v) in fixed_slots.zip(fixed) {
        slots[slot.index()] = Some(v);
    }

    let mut out = [0.0; N_SLOTS];
    for slot in Slot::ALL {
        out[slot.index()] = slots[slot.index()]
            .ok_or_else(|| Error::InvalidParameterShape(format!("slot {} unset", slot.name())))?;
    }
    Ok(out)
}

/// Map free optimizer parameters (plus fixed values) to the eight named slots.
///
/// Without subgroup validity, `am`, `d0m` and `d1m` are overridden by `ab`,
/// `d0b` and `d1b`; `qm` is never collapsed. With `q_on_log_odds_range`, the
/// slot-2 value is a log-odds delta: `qm = inverse_logit(logit(qb) + qm_raw)`.
pub fn pack(raw: &[f64], opts: &PackOptions) -> Result<PackedParameters> {
    let s = fill_slots(raw, opts)?;
    let at = |slot: Slot| s[slot.index()];
    let modifier = |m: Slot, b: Slot| if opts.allow_subgroup_validity { at(m) } else { at(b) };

    let qb = at(Slot::Qb);
    let qm = if opts.q_on_log_odds_range {
        if !(qb > 0.0 && qb < 1.0) {
            return Err(Error::Validation(format!(
                "qb must lie in (0, 1) when qm is a log-odds delta, got {}",
                qb
            )));
        }
        inverse_logit(logit(qb) + at(Slot::Qm))
    } else {
        at(Slot::Qm)
    };

    Ok(PackedParameters {
        qb,
        qm,
        ab: at(Slot::Ab),
        am: modifier(Slot::Am, Slot::Ab),
        d0b: at(Slot::D0b),
        d0m: modifier(Slot::D0m, Slot::D0b),
        d1b: at(Slot::D1b),
        d1m: modifier(Slot::D1m, Slot::D1b),
    })
}
