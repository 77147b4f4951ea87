//! Forecast ensemble output

use super::timing::NowcastTiming;
use crate::config::Domain;
use crate::field::Field;

/// How member trajectories were scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// One member after another on the calling thread
    Sequential,
    /// rayon fan-out over members
    Parallel,
}

impl Backend {
    /// Lowercase name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
        }
    }
}

impl std::fmt::Display for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Forecast fields indexed by `(member, lead time, row, col)`.
///
/// Lead time `t` (0-based) is the forecast `t + 1` timesteps after the most
/// recent observation. Members are stored in member-index order; when the
/// `drop` failure policy removed members, [`ForecastEnsemble::member_ids`]
/// maps storage position to the original member index.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastEnsemble {
    members: Vec<Vec<Field>>,
    member_ids: Vec<usize>,
    width: usize,
    height: usize,
    n_timesteps: usize,
    domain: Domain,
    backend: Backend,
    timing: NowcastTiming,
}

impl ForecastEnsemble {
    pub(crate) fn new(
        members: Vec<(usize, Vec<Field>)>,
        width: usize,
        height: usize,
        n_timesteps: usize,
        domain: Domain,
        backend: Backend,
    ) -> Self {
        let (member_ids, members) = members.into_iter().unzip();
        Self {
            members,
            member_ids,
            width,
            height,
            n_timesteps,
            domain,
            backend,
            timing: NowcastTiming::default(),
        }
    }

    pub(crate) fn with_timing(mut self, timing: NowcastTiming) -> Self {
        self.timing = timing;
        self
    }

    /// Number of members returned
    #[must_use]
    pub fn n_members(&self) -> usize {
        self.members.len()
    }

    /// Number of lead times per member
    #[must_use]
    pub fn n_timesteps(&self) -> usize {
        self.n_timesteps
    }

    /// Array shape `(members, lead times, rows, cols)`
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize, usize) {
        (self.n_members(), self.n_timesteps, self.height, self.width)
    }

    /// Value at `[member, lead_time, row, col]`
    ///
    /// # Panics
    ///
    /// Panics if any index is out of range
    #[must_use]
    pub fn get(&self, member: usize, lead_time: usize, row: usize, col: usize) -> f32 {
        self.members[member][lead_time].get(row, col)
    }

    /// One forecast field
    #[must_use]
    pub fn field(&self, member: usize, lead_time: usize) -> &Field {
        &self.members[member][lead_time]
    }

    /// All lead times of one member
    #[must_use]
    pub fn member(&self, member: usize) -> &[Field] {
        &self.members[member]
    }

    /// Original member index of each stored member
    #[must_use]
    pub fn member_ids(&self) -> &[usize] {
        &self.member_ids
    }

    /// Every member's field at one lead time
    #[must_use]
    pub fn at_lead_time(&self, lead_time: usize) -> Vec<&Field> {
        self.members.iter().map(|m| &m[lead_time]).collect()
    }

    /// Domain the AR model was integrated in
    #[must_use]
    pub fn domain(&self) -> Domain {
        self.domain
    }

    /// Scheduling backend that produced the members
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Phase timings
    #[must_use]
    pub fn timing(&self) -> NowcastTiming {
        self.timing
    }

    /// Ensemble mean at one lead time
    #[must_use]
    pub fn mean_field(&self, lead_time: usize) -> Field {
        let mut sum = vec![0.0_f64; self.width * self.height];
        for member in &self.members {
            for (s, &v) in sum.iter_mut().zip(&member[lead_time].data) {
                *s += f64::from(v);
            }
        }
        let n = self.members.len().max(1) as f64;
        Field {
            data: sum.into_iter().map(|s| (s / n) as f32).collect(),
            width: self.width,
            height: self.height,
        }
    }

    /// Across-member variance averaged over the grid at one lead time
    #[must_use]
    pub fn spread(&self, lead_time: usize) -> f64 {
        let n = self.members.len();
        if n < 2 {
            return 0.0;
        }
        let mean = self.mean_field(lead_time);
        let mut acc = 0.0_f64;
        for member in &self.members {
            for (&v, &m) in member[lead_time].data.iter().zip(&mean.data) {
                let d = f64::from(v) - f64::from(m);
                acc += d * d;
            }
        }
        acc / (n as f64 * mean.data.len() as f64)
    }

    /// Values flattened in `(member, lead time, row, col)` order
    #[must_use]
    pub fn to_flat(&self) -> Vec<f32> {
        self.members
            .iter()
            .flat_map(|m| m.iter().flat_map(|f| f.data.iter().copied()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ensemble() -> ForecastEnsemble {
        let members = (0..3)
            .map(|m| {
                let fields = (0..2)
                    .map(|t| Field::with_value(4, 2, (m * 10 + t) as f32))
                    .collect();
                (m * 2, fields)
            })
            .collect();
        ForecastEnsemble::new(members, 4, 2, 2, Domain::Spatial, Backend::Sequential)
    }

    #[test]
    fn test_indexing() {
        let e = ensemble();
        assert_eq!(e.shape(), (3, 2, 2, 4));
        assert_eq!(e.get(2, 1, 1, 3), 21.0);
        assert_eq!(e.member_ids(), &[0, 2, 4]);
        assert_eq!(e.at_lead_time(0).len(), 3);
        assert_eq!(e.to_flat().len(), 3 * 2 * 2 * 4);
        assert_eq!(e.to_flat()[8], 1.0);
    }

    #[test]
    fn test_mean_and_spread() {
        let e = ensemble();
        assert_eq!(e.mean_field(0).get(0, 0), 10.0);
        // members 0, 10, 20 → population variance 200/3
        assert!((e.spread(0) - 200.0 / 3.0).abs() < 1e-9);
    }
}
