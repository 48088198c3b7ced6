use super::{PhaseEquilibrium, TraceFailure};
use crate::activity::ActivityModel;
use crate::equilibrium_system::EquilibriumSystem;
use crate::errors::{PhaseqError, PhaseqResult};
use crate::{SolverOptions, Verbosity};
use itertools::Itertools;
use nalgebra::{DVector, dvector};
use ndarray::Array1;
use quantity::Temperature;

const DEFAULT_TIE_LINES: usize = 10;
/// Compositions along the binary edges that are tested for a miscibility gap.
const EDGE_RATIOS: [f64; 5] = [0.5, 0.3, 0.7, 0.15, 0.85];
const EDGE_THIRD: f64 = 0.01;
const MAX_LINE_PARAMETER: f64 = 0.98;
const PLAIT_BISECTIONS: usize = 4;
const MIDPOINT_FACTOR: f64 = 2.0;
const GRID_STEPS: usize = 10;
const MAX_FLASHES: usize = 200;
const REFINEMENT_PASSES: usize = 3;
const DUPLICATE_DISTANCE: f64 = 1e-3;

/// Barycentric projection of a ternary composition into the plane.
///
/// The first component is at the origin, the second at `(1, 0)`
/// and the third at `(0.5, √3/2)`.
pub fn project_ternary(molefracs: &DVector<f64>) -> [f64; 2] {
    [
        molefracs[1] + 0.5 * molefracs[2],
        0.5 * 3f64.sqrt() * molefracs[2],
    ]
}

fn distance(x1: &DVector<f64>, x2: &DVector<f64>) -> f64 {
    let [a1, b1] = project_ternary(x1);
    let [a2, b2] = project_ternary(x2);
    (a1 - a2).hypot(b1 - b2)
}

/// Two liquid phases in equilibrium, connected by the feed.
#[derive(Clone, Debug)]
pub struct TieLine {
    pub feed: DVector<f64>,
    pub phase_i: DVector<f64>,
    pub phase_ii: DVector<f64>,
    /// Fraction of the second phase.
    pub beta: f64,
}

impl TieLine {
    fn from_equilibrium(feed: DVector<f64>, vle: &PhaseEquilibrium<2>) -> Self {
        Self {
            feed,
            phase_i: vle.phase_i().molefracs.clone(),
            phase_ii: vle.phase_ii().molefracs.clone(),
            beta: vle.beta(),
        }
    }

    /// Length of the tie line in the projected triangle.
    pub fn length(&self) -> f64 {
        distance(&self.phase_i, &self.phase_ii)
    }
}

/// Binodal curve and tie-lines of a ternary system at constant temperature.
#[derive(Clone, Debug)]
pub struct TernaryLleDiagram {
    pub temperature: Temperature,
    pub tie_lines: Vec<TieLine>,
    /// Closed curve through all phase compositions, the first point is
    /// repeated at the end. The closing segment is the largest gap of the
    /// ordered cloud, i.e. the base of the two-phase region on the
    /// immiscible binary edge.
    pub binodal: Vec<DVector<f64>>,
    /// Binary subsystem with a miscibility gap that seeded the tie-lines.
    pub immiscible_pair: Option<(usize, usize)>,
    /// Number of flash calculations.
    pub flashes: usize,
    pub failures: Vec<TraceFailure>,
}

/// Flash calculations with a common step budget.
struct Tracer<'a, A> {
    system: &'a EquilibriumSystem<A>,
    temperature: Temperature,
    options: SolverOptions,
    flashes: usize,
    failures: Vec<TraceFailure>,
}

impl<A: ActivityModel> Tracer<'_, A> {
    fn exhausted(&self) -> bool {
        self.flashes >= MAX_FLASHES
    }

    /// Converged two-phase flash at `feed`, `None` otherwise.
    fn flash(
        &mut self,
        feed: &DVector<f64>,
        initial_state: Option<&PhaseEquilibrium<2>>,
    ) -> Option<PhaseEquilibrium<2>> {
        if self.exhausted() {
            return None;
        }
        let index = self.flashes;
        self.flashes += 1;
        let failure = |reason: String| TraceFailure {
            index,
            x1: feed[0],
            reason,
        };
        match PhaseEquilibrium::lle_flash(
            self.system,
            self.temperature,
            feed,
            initial_state,
            self.options,
        ) {
            Ok(vle) if vle.two_phase && vle.converged() => Some(vle),
            Ok(vle) if vle.two_phase => {
                self.failures.push(failure(
                    vle.convergence
                        .warning()
                        .unwrap_or_else(|| "not converged".into()),
                ));
                None
            }
            Ok(_) => None,
            Err(e) => {
                self.failures.push(failure(e.to_string()));
                None
            }
        }
    }
}

impl TernaryLleDiagram {
    /// Trace the liquid-liquid phase diagram of a ternary system.
    ///
    /// Tie-lines are calculated for feeds on the line between a two-phase
    /// point on an immiscible binary edge and the opposite vertex, each
    /// flash initialized with the previous tie-line. If no binary edge
    /// splits, feeds on a grid over the triangle are used instead.
    pub fn new<A: ActivityModel>(
        system: &EquilibriumSystem<A>,
        temperature: Temperature,
        tie_lines: Option<usize>,
        options: SolverOptions,
    ) -> PhaseqResult<Self> {
        if system.components() != 3 {
            return Err(PhaseqError::UnsupportedSystemSize {
                calculation: "ternary LLE diagram".into(),
                expected: "3".into(),
                found: system.components(),
            });
        }
        let npoints = tie_lines.unwrap_or(DEFAULT_TIE_LINES).max(2);
        let mut tracer = Tracer {
            system,
            temperature,
            options: SolverOptions {
                verbosity: Verbosity::None,
                ..options
            },
            flashes: 0,
            failures: Vec::new(),
        };

        let edge = find_immiscible_edge(&mut tracer);
        let (immiscible_pair, lines) = match edge {
            Some((pair, feed, vle)) => {
                let vertex = DVector::from_fn(3, |i, _| {
                    if i == pair.0 || i == pair.1 { 0.0 } else { 1.0 }
                });
                (
                    Some(pair),
                    march_toward_vertex(&mut tracer, &feed, &vertex, vle, npoints),
                )
            }
            None => (None, grid_sweep(&mut tracer)),
        };
        log_result!(
            options.verbosity,
            "Ternary LLE diagram: {} tie-line(s) from {} flash(es), {} failure(s)\n",
            lines.len(),
            tracer.flashes,
            tracer.failures.len()
        );

        let points = lines
            .iter()
            .flat_map(|t| [t.phase_i.clone(), t.phase_ii.clone()])
            .collect();
        Ok(Self {
            temperature,
            binodal: assemble_binodal(points),
            tie_lines: lines,
            immiscible_pair,
            flashes: tracer.flashes,
            failures: tracer.failures,
        })
    }
}

type EdgePoint = ((usize, usize), DVector<f64>, PhaseEquilibrium<2>);

fn find_immiscible_edge<A: ActivityModel>(tracer: &mut Tracer<A>) -> Option<EdgePoint> {
    for (i, j) in (0..3).tuple_combinations() {
        for ratio in EDGE_RATIOS {
            let feed = DVector::from_fn(3, |k, _| {
                if k == i {
                    (1.0 - EDGE_THIRD) * ratio
                } else if k == j {
                    (1.0 - EDGE_THIRD) * (1.0 - ratio)
                } else {
                    EDGE_THIRD
                }
            });
            if let Some(vle) = tracer.flash(&feed, None) {
                return Some(((i, j), feed, vle));
            }
        }
    }
    None
}

fn march_toward_vertex<A: ActivityModel>(
    tracer: &mut Tracer<A>,
    start: &DVector<f64>,
    vertex: &DVector<f64>,
    vle: PhaseEquilibrium<2>,
    npoints: usize,
) -> Vec<TieLine> {
    let feed_at = |s: f64| start * (1.0 - s) + vertex * s;
    let mut lines = vec![(0.0, TieLine::from_equilibrium(start.clone(), &vle), vle)];

    // continuation along the line until the system is miscible
    let parameters = Array1::linspace(0.0, MAX_LINE_PARAMETER, 2 * npoints);
    let mut s_single = None;
    let mut single = 0;
    for &s in parameters.iter().skip(1) {
        let feed = feed_at(s);
        let last = lines.last().map(|l| &l.2);
        match tracer.flash(&feed, last) {
            Some(vle) => {
                lines.push((s, TieLine::from_equilibrium(feed, &vle), vle));
                single = 0;
            }
            None if tracer.exhausted() => break,
            None => {
                if single == 0 {
                    s_single = Some(s);
                }
                single += 1;
                if single >= 2 {
                    break;
                }
            }
        }
    }

    // approach the plait point
    let s_last = lines.last().map(|l| l.0);
    if let (Some(mut s_b), Some(mut s_a)) = (s_single, s_last)
        && s_b > s_a
    {
        for _ in 0..PLAIT_BISECTIONS {
            let s = 0.5 * (s_a + s_b);
            let feed = feed_at(s);
            let last = lines.last().map(|l| &l.2);
            match tracer.flash(&feed, last) {
                Some(vle) => {
                    lines.push((s, TieLine::from_equilibrium(feed, &vle), vle));
                    s_a = s;
                }
                None => s_b = s,
            }
        }
    }

    // refine where consecutive tie-lines are far apart
    lines.sort_by(|a, b| a.0.total_cmp(&b.0));
    for _ in 0..REFINEMENT_PASSES {
        let gaps: Vec<_> = lines
            .windows(2)
            .map(|w| {
                distance(&w[0].1.phase_i, &w[1].1.phase_i)
                    .max(distance(&w[0].1.phase_ii, &w[1].1.phase_ii))
            })
            .collect();
        let Some(median) = median(&gaps) else {
            break;
        };
        let mut refined = Vec::new();
        for (w, &gap) in lines.windows(2).zip(gaps.iter()) {
            if gap > MIDPOINT_FACTOR * median {
                let s = 0.5 * (w[0].0 + w[1].0);
                let feed = feed_at(s);
                if let Some(vle) = tracer.flash(&feed, Some(&w[0].2)) {
                    refined.push((s, TieLine::from_equilibrium(feed, &vle), vle));
                }
            }
        }
        if refined.is_empty() {
            break;
        }
        lines.extend(refined);
        lines.sort_by(|a, b| a.0.total_cmp(&b.0));
    }
    lines.into_iter().map(|(_, t, _)| t).collect()
}

fn grid_sweep<A: ActivityModel>(tracer: &mut Tracer<A>) -> Vec<TieLine> {
    let mut lines = Vec::new();
    for i in 1..GRID_STEPS {
        for j in 1..GRID_STEPS - i {
            let (x1, x2) = (i as f64 / GRID_STEPS as f64, j as f64 / GRID_STEPS as f64);
            let feed = dvector![x1, x2, 1.0 - x1 - x2];
            if let Some(vle) = tracer.flash(&feed, None) {
                lines.push(TieLine::from_equilibrium(feed, &vle));
            }
        }
    }
    lines
}

fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    Some(sorted[sorted.len() / 2])
}

/// Order a cloud of phase compositions into a closed curve.
///
/// Points are sorted by their polar angle around the centroid of the
/// projected cloud, starting after the largest gap. The first point is
/// repeated at the end.
fn assemble_binodal(points: Vec<DVector<f64>>) -> Vec<DVector<f64>> {
    let mut unique: Vec<DVector<f64>> = Vec::with_capacity(points.len() + 1);
    for p in points {
        if unique.iter().all(|q| distance(&p, q) > DUPLICATE_DISTANCE) {
            unique.push(p);
        }
    }
    let Some(first) = unique.first().cloned() else {
        return unique;
    };
    if unique.len() < 3 {
        unique.push(first);
        return unique;
    }

    let projected: Vec<_> = unique.iter().map(project_ternary).collect();
    let m = projected.len() as f64;
    let cx = projected.iter().map(|p| p[0]).sum::<f64>() / m;
    let cy = projected.iter().map(|p| p[1]).sum::<f64>() / m;
    let angle = |p: &DVector<f64>| {
        let [x, y] = project_ternary(p);
        (y - cy).atan2(x - cx)
    };
    unique.sort_by(|a, b| angle(a).total_cmp(&angle(b)));

    // start after the largest gap, so that it becomes the closing segment
    let n = unique.len();
    let (largest, _) = (0..n)
        .map(|i| distance(&unique[i], &unique[(i + 1) % n]))
        .enumerate()
        .fold((0, 0.0), |acc, (i, g)| if g > acc.1 { (i, g) } else { acc });
    unique.rotate_left((largest + 1) % n);
    unique.push(unique[0].clone());
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::utils::Margules;
    use crate::parameter::{ComponentRecord, Identifier};
    use approx::assert_relative_eq;
    use nalgebra::DMatrix;
    use quantity::KELVIN;

    fn spacing(curve: &[DVector<f64>]) -> Vec<f64> {
        curve.windows(2).map(|w| distance(&w[0], &w[1])).collect()
    }

    #[test]
    fn projection_of_vertices() {
        assert_eq!(project_ternary(&dvector![1.0, 0.0, 0.0]), [0.0, 0.0]);
        assert_eq!(project_ternary(&dvector![0.0, 1.0, 0.0]), [1.0, 0.0]);
        let [x, y] = project_ternary(&dvector![0.0, 0.0, 1.0]);
        assert_relative_eq!(x, 0.5);
        assert_relative_eq!(y, 0.75f64.sqrt());
    }

    #[test]
    fn scrambled_cloud_is_ordered() {
        // points on a circle around the center of the triangle in scrambled order
        let center = [0.5, 0.3];
        let order = [7, 2, 11, 0, 5, 9, 3, 14, 1, 12, 6, 10, 4, 13, 8, 15];
        let points: Vec<_> = order
            .iter()
            .map(|&k| {
                let phi = k as f64 / 16.0 * std::f64::consts::TAU;
                let (x, y) = (center[0] + 0.2 * phi.cos(), center[1] + 0.2 * phi.sin());
                let x3 = y / (0.5 * 3f64.sqrt());
                let x2 = x - 0.5 * x3;
                dvector![1.0 - x2 - x3, x2, x3]
            })
            .collect();
        let curve = assemble_binodal(points);
        assert_eq!(curve.len(), 17);
        assert_relative_eq!(curve[0], curve[16]);
        let gaps = spacing(&curve);
        let first = gaps[0];
        assert!(gaps.iter().all(|g| (g - first).abs() < 1e-10));
    }

    #[test]
    fn duplicates_are_removed() {
        let p = dvector![0.2, 0.3, 0.5];
        let curve = assemble_binodal(vec![p.clone(), p.clone(), p.clone()]);
        assert_eq!(curve.len(), 2);
    }

    #[test]
    fn binodal_of_partially_miscible_ternary() -> PhaseqResult<()> {
        let a = DMatrix::from_row_slice(3, 3, &[0.0, 900.0, 0.0, 900.0, 0.0, 0.0, 0.0, 0.0, 0.0]);
        let components = (1..=3)
            .map(|i| ComponentRecord::new(Identifier::from_name(&format!("C{i}")), 0.0))
            .collect();
        let system = EquilibriumSystem::new(Margules::new(a), components)?;
        let diagram =
            TernaryLleDiagram::new(&system, 300.0 * KELVIN, Some(6), SolverOptions::default())?;
        assert_eq!(diagram.immiscible_pair, Some((0, 1)));
        assert!(diagram.tie_lines.len() >= 3);
        assert!(diagram.flashes <= MAX_FLASHES);
        for t in &diagram.tie_lines {
            assert_relative_eq!(
                &t.phase_i * (1.0 - t.beta) + &t.phase_ii * t.beta,
                t.feed,
                epsilon = 1e-4
            );
        }

        // only phase compositions of converged flashes are on the curve
        let phases: Vec<_> = diagram
            .tie_lines
            .iter()
            .flat_map(|t| [&t.phase_i, &t.phase_ii])
            .collect();
        let binodal = &diagram.binodal;
        assert_relative_eq!(binodal[0], binodal[binodal.len() - 1]);
        for p in binodal {
            assert!(phases.iter().any(|q| distance(p, q) < 1e-12));
        }
        assert_smooth(binodal);

        // the ordering does not depend on the order of the tie-lines
        let mut scrambled: Vec<_> = phases.into_iter().cloned().collect();
        let half = scrambled.len() / 2;
        scrambled.rotate_left(half);
        scrambled.reverse();
        assert_smooth(&assemble_binodal(scrambled));
        Ok(())
    }

    /// No jump along the curve is larger than five times the median
    /// spacing. The closing segment is the largest one.
    fn assert_smooth(curve: &[DVector<f64>]) {
        let gaps = spacing(curve);
        let Some((closing, gaps)) = gaps.split_last() else {
            panic!("empty binodal");
        };
        let median = median(gaps).unwrap_or(0.0);
        assert!(median > 0.0);
        assert!(gaps.iter().all(|&g| g <= 5.0 * median && g <= *closing));
    }

    #[test]
    fn binary_system_is_rejected() {
        let components = (1..=2)
            .map(|i| ComponentRecord::new(Identifier::from_name(&format!("C{i}")), 0.0))
            .collect();
        let system =
            EquilibriumSystem::new(Margules::binary(900.0), components).expect("consistent system");
        let res = TernaryLleDiagram::new(&system, 300.0 * KELVIN, None, SolverOptions::default());
        assert!(matches!(res, Err(PhaseqError::UnsupportedSystemSize { .. })));
    }
}
