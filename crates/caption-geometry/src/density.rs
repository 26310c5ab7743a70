//! One-dimensional occupancy profiles and their edges.

/// Counts, per pixel in `0..len`, how many spans `[start, end)` cover it.
pub fn coverage_profile<I>(len: usize, spans: I) -> Vec<f64>
where
    I: IntoIterator<Item = (f64, f64)>,
{
    let mut steps = vec![0i64; len + 1];
    for (start, end) in spans {
        if !start.is_finite() || !end.is_finite() {
            continue;
        }
        let start = start.floor().clamp(0.0, len as f64) as usize;
        let end = end.ceil().clamp(0.0, len as f64) as usize;
        if start >= end {
            continue;
        }
        steps[start] += 1;
        steps[end] -= 1;
    }

    let mut profile = Vec::with_capacity(len);
    let mut running = 0i64;
    for step in steps.iter().take(len) {
        running += step;
        profile.push(running as f64);
    }
    profile
}

/// `d[i] = p[i] - p[i - 1]` with zero padding on both ends, so `d` has
/// `len + 1` entries and index `i` is the boundary before pixel `i`.
pub fn derivative(profile: &[f64]) -> Vec<f64> {
    let mut previous = 0.0;
    let mut out = Vec::with_capacity(profile.len() + 1);
    for &value in profile {
        out.push(value - previous);
        previous = value;
    }
    out.push(-previous);
    out
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Edge {
    pub position: usize,
    pub strength: f64,
}

impl Edge {
    /// Edge strength relative to the profile peak, in `[0, 1]` for real data.
    pub fn sharpness(&self, peak: f64) -> f64 {
        if peak > 0.0 {
            self.strength / peak
        } else {
            0.0
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProfileEdges {
    /// Largest rise, leftmost on ties.
    pub rising: Edge,
    /// Largest fall, rightmost on ties.
    pub falling: Edge,
    pub peak: f64,
}

pub fn find_edges(profile: &[f64]) -> Option<ProfileEdges> {
    let peak = profile.iter().copied().fold(0.0_f64, f64::max);
    if peak <= 0.0 {
        return None;
    }

    let slope = derivative(profile);
    let mut rising = Edge {
        position: 0,
        strength: 0.0,
    };
    let mut falling = Edge {
        position: profile.len(),
        strength: 0.0,
    };
    for (position, &d) in slope.iter().enumerate() {
        if d > rising.strength {
            rising = Edge {
                position,
                strength: d,
            };
        }
        if d < 0.0 && -d >= falling.strength {
            falling = Edge {
                position,
                strength: -d,
            };
        }
    }
    Some(ProfileEdges {
        rising,
        falling,
        peak,
    })
}
