use rand::Rng;

/// Tournament selection: draws `pool_size` distinct entrants in random order
/// and returns the two fittest as `(first, second)` indices into `fitness`.
///
/// Earlier draws win ties. Returns `None` with fewer than two candidates.
pub fn tournament<R: Rng + ?Sized>(
    fitness: &[f32],
    pool_size: usize,
    rng: &mut R,
) -> Option<(usize, usize)> {
    let n = fitness.len();
    if n < 2 {
        return None;
    }
    let pool_size = pool_size.clamp(2, n);

    // Partial Fisher-Yates: the first `pool_size` slots hold the draw order.
    let mut order: Vec<usize> = (0..n).collect();
    for i in 0..pool_size {
        let j = rng.random_range(i..n);
        order.swap(i, j);
    }

    let mut best: Option<usize> = None;
    let mut second: Option<usize> = None;
    for &entrant in &order[..pool_size] {
        match best {
            Some(b) if fitness[entrant] <= fitness[b] => match second {
                Some(s) if fitness[entrant] <= fitness[s] => {}
                _ => second = Some(entrant),
            },
            _ => {
                second = best;
                best = Some(entrant);
            }
        }
    }
    best.zip(second)
}
