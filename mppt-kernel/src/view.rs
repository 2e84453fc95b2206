//! Document JSON du live view, partagé par le websocket et `/api/livedata/status`.

use crate::aggregate::FleetTotals;
use crate::clock::Tick;
use crate::codes;
use crate::fleet::Fleet;
use crate::models::DeviceRecord;
use serde::Serialize;

/// Valeur affichable : valeur, unité, nombre de décimales
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Measure<T> {
    pub v: T,
    pub u: &'static str,
    pub d: u8,
}

fn measure<T>(v: T, u: &'static str, d: u8) -> Measure<T> {
    Measure { v, u, d }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DayCounter {
    pub v: u16,
    pub u: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct DeviceInfo {
    #[serde(rename = "data_age")]
    pub data_age: u64,
    #[serde(rename = "age_critical")]
    pub age_critical: bool,
    pub pid: String,
    pub ser: String,
    pub fw: String,
    pub load: &'static str,
    pub cs: String,
    pub err: String,
    pub or: String,
    pub mppt: String,
    pub hsds: DayCounter,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub struct OutputInfo {
    pub p: Measure<i32>,
    pub v: Measure<f64>,
    pub i: Measure<f64>,
    pub e: Measure<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InputInfo {
    #[serde(rename = "PPV")]
    pub ppv: Measure<i32>,
    #[serde(rename = "VPV")]
    pub vpv: Measure<f64>,
    #[serde(rename = "IPV")]
    pub ipv: Measure<f64>,
    #[serde(rename = "YieldToday")]
    pub yield_today: Measure<f64>,
    #[serde(rename = "YieldYesterday")]
    pub yield_yesterday: Measure<f64>,
    #[serde(rename = "YieldTotal")]
    pub yield_total: Measure<f64>,
    #[serde(rename = "MaximumPowerToday")]
    pub max_power_today: Measure<i32>,
    #[serde(rename = "MaximumPowerYesterday")]
    pub max_power_yesterday: Measure<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MpptView {
    pub order: usize,
    pub device: DeviceInfo,
    pub output: OutputInfo,
    pub input: InputInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TotalsView {
    #[serde(rename = "P")]
    pub p: Measure<i64>,
    #[serde(rename = "PPV")]
    pub ppv: Measure<i64>,
    #[serde(rename = "E")]
    pub e: Measure<f64>,
    #[serde(rename = "YieldTotal")]
    pub yield_total: Measure<f64>,
    #[serde(rename = "YieldToday")]
    pub yield_today: Measure<f64>,
    #[serde(rename = "MaximumPowerToday")]
    pub max_power_today: Measure<f64>,
    #[serde(rename = "YieldYesterday")]
    pub yield_yesterday: Measure<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveView {
    pub mppts: Vec<MpptView>,
    pub total: TotalsView,
}

impl LiveView {
    /// Vue consolidée de la flotte. Les appareils qui n'ont encore jamais
    /// envoyé de frame ne sont pas listés.
    pub fn build(fleet: &Fleet, now: Tick, include_invalid: bool) -> Self {
        let mut totals = FleetTotals::default();
        let mut mppts = Vec::new();

        for record in fleet.devices() {
            let valid = fleet.is_data_valid(record.index, now);
            if valid || include_invalid {
                totals.add(&record.frame);
            }
            if let Some(last) = record.last_update {
                mppts.push(mppt_view(record, now.since(last).as_secs(), !valid));
            }
        }

        Self { mppts, total: totals_view(&totals) }
    }
}

fn mppt_view(record: &DeviceRecord, data_age: u64, age_critical: bool) -> MpptView {
    let frame = &record.frame;
    MpptView {
        order: record.index,
        device: DeviceInfo {
            data_age,
            age_critical,
            pid: codes::pid_name(frame.pid),
            ser: frame.ser.clone(),
            fw: frame.fw.clone(),
            load: if frame.load { "ON" } else { "OFF" },
            cs: codes::cs_name(frame.cs),
            err: codes::err_name(frame.err),
            or: codes::or_name(frame.or),
            mppt: codes::mppt_name(frame.mppt),
            hsds: DayCounter { v: frame.hsds, u: "d" },
        },
        output: OutputInfo {
            p: measure(frame.p, "W", 0),
            v: measure(frame.v, "V", 2),
            i: measure(frame.i, "A", 2),
            e: measure(frame.e, "%", 1),
        },
        input: InputInfo {
            ppv: measure(frame.ppv, "W", 0),
            vpv: measure(frame.vpv, "V", 2),
            ipv: measure(frame.ipv, "A", 2),
            yield_today: measure(frame.h20, "kWh", 3),
            yield_yesterday: measure(frame.h22, "kWh", 3),
            yield_total: measure(frame.h19, "kWh", 3),
            max_power_today: measure(frame.h21, "W", 0),
            max_power_yesterday: measure(frame.h23, "W", 0),
        },
    }
}

fn totals_view(totals: &FleetTotals) -> TotalsView {
    TotalsView {
        p: measure(totals.p, "W", 0),
        ppv: measure(totals.ppv, "W", 0),
        e: measure(totals.e, "%", 1),
        yield_total: measure(totals.h19, "kWh", 3),
        yield_today: measure(totals.h20, "kWh", 3),
        max_power_today: measure(totals.h21, "W", 0),
        yield_yesterday: measure(totals.h22, "kWh", 3),
    }
}
