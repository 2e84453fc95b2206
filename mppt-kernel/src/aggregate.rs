//! Totaux de flotte, recalculés à chaque cycle (aucun état entre cycles).

use crate::models::Frame;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetTotals {
    /// puissance de sortie cumulée (W)
    pub p: i64,
    /// puissance panneaux cumulée (W)
    pub ppv: i64,
    /// rendement moyen (%)
    pub e: f64,
    pub h19: f64,
    pub h20: f64,
    pub h21: f64,
    pub h22: f64,
    count: usize,
    e_sum: f64,
}

impl FleetTotals {
    pub fn add(&mut self, frame: &Frame) {
        self.count += 1;
        self.p += frame.p as i64;
        self.ppv += frame.ppv as i64;
        self.e_sum += frame.e;
        self.e = self.e_sum / self.count as f64;
        self.h19 += frame.h19;
        self.h20 += frame.h20;
        self.h21 += frame.h21 as f64;
        self.h22 += frame.h22;
    }

    pub fn count(&self) -> usize {
        self.count
    }

    /// Paires (nom, payload) publiées sur `<namespace>/<nom>`
    pub fn entries(&self) -> [(&'static str, String); 7] {
        [
            ("PPV_total", self.ppv.to_string()),
            ("P_total", self.p.to_string()),
            ("E_total", format!("{:.2}", self.e)),
            ("H19_total", format!("{:.2}", self.h19)),
            ("H20_total", format!("{:.2}", self.h20)),
            ("H21_total", format!("{:.2}", self.h21)),
            ("H22_total", format!("{:.2}", self.h22)),
        ]
    }
}

impl<'a> FromIterator<&'a Frame> for FleetTotals {
    fn from_iter<T: IntoIterator<Item = &'a Frame>>(iter: T) -> Self {
        let mut totals = FleetTotals::default();
        for frame in iter {
            totals.add(frame);
        }
        totals
    }
}
