use glam::Vec3;
use rand::Rng;

use crate::field::Particle;

/// Largest particle count the pairwise scan is meant for.
pub const MAX_SCAN_PARTICLES: usize = 100;
pub const DEFAULT_LINK_THRESHOLD: f32 = 3.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Link {
    pub a: usize,
    pub b: usize,
    pub start: Vec3,
    pub end: Vec3,
    /// Pulse offset in `[0, 1)`.
    pub pulse_phase: f32,
}

impl Link {
    pub fn length(&self) -> f32 {
        self.start.distance(self.end)
    }
}

/// Connects particle pairs closer than `threshold`, visiting `(i, j)` with
/// `i < j` in lexical order and stopping once `max_links` exist.
pub fn build_links<R: Rng + ?Sized>(
    particles: &[Particle],
    max_links: usize,
    threshold: f32,
    rng: &mut R,
) -> Vec<Link> {
    debug_assert!(
        particles.len() <= MAX_SCAN_PARTICLES,
        "pairwise link scan over {} particles",
        particles.len()
    );

    let mut links = Vec::with_capacity(max_links.min(particles.len()));
    if max_links == 0 {
        return links;
    }
    'outer: for (i, first) in particles.iter().enumerate() {
        for (offset, second) in particles[i + 1..].iter().enumerate() {
            if first.position.distance(second.position) < threshold {
                links.push(Link {
                    a: i,
                    b: i + 1 + offset,
                    start: first.position,
                    end: second.position,
                    pulse_phase: rng.gen_range(0.0..1.0),
                });
                if links.len() >= max_links {
                    break 'outer;
                }
            }
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn at(x: f32, y: f32) -> Particle {
        Particle {
            position: Vec3::new(x, y, 0.0),
            activity: 0.5,
            phase: 0.0,
        }
    }

    #[test]
    fn threshold_is_strict() {
        let mut rng = StdRng::seed_from_u64(2);
        let particles = [at(0.0, 0.0), at(3.0, 0.0), at(0.0, 2.999)];
        let links = build_links(&particles, 50, DEFAULT_LINK_THRESHOLD, &mut rng);
        assert_eq!(links.len(), 1);
        assert_eq!((links[0].a, links[0].b), (0, 2));
    }

    #[test]
    fn visits_pairs_in_lexical_order_and_caps() {
        let mut rng = StdRng::seed_from_u64(4);
        let particles = [at(0.0, 0.0), at(1.0, 0.0), at(2.0, 0.0), at(0.5, 0.5)];
        let links = build_links(&particles, 3, DEFAULT_LINK_THRESHOLD, &mut rng);
        let pairs: Vec<_> = links.iter().map(|link| (link.a, link.b)).collect();
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3)]);
        assert!(links.iter().all(|link| (0.0..1.0).contains(&link.pulse_phase)));
    }

    #[test]
    fn pairs_are_unique() {
        let mut rng = StdRng::seed_from_u64(8);
        let particles: Vec<_> = (0..20).map(|i| at(i as f32 * 0.1, 0.0)).collect();
        let links = build_links(&particles, usize::MAX, DEFAULT_LINK_THRESHOLD, &mut rng);
        assert_eq!(links.len(), 20 * 19 / 2);
        let mut seen = std::collections::HashSet::new();
        for link in &links {
            assert!(link.a < link.b);
            assert!(seen.insert((link.a, link.b)));
            assert!(link.length() < DEFAULT_LINK_THRESHOLD);
        }
    }

    #[test]
    fn zero_budget_yields_nothing() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(build_links(&[at(0.0, 0.0), at(0.1, 0.0)], 0, 3.0, &mut rng).is_empty());
    }
}
