use std::collections::HashMap;
use std::env;
use std::error::Error;
use std::f32::consts::TAU;
use std::fs::File;
use std::io::BufWriter;
use std::process::ExitCode;

use genepool::{
    BirthsDeathsLog, PopulationError, PopulationManager, RectPatch, Settings, SpecimenId,
    StepInput, Vitals, map_range,
};
use nalgebra::{Point2, Vector2, center, distance};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha12Rng;
use tracing::{error, info};
use tracing_subscriber::FmtSubscriber;

const ENCOUNTER_RADIUS: f32 = 2.0;
const FOOD_ENERGY: f32 = 1.5;
const REPORT_INTERVAL: u64 = 100;

/// Toy world: random walkers paying a metabolic cost and grazing on one food
/// patch per domain.
struct Habitat {
    rng: ChaCha12Rng,
    headings: HashMap<SpecimenId, f32>,
}

impl Habitat {
    fn new(seed: u64) -> Self {
        Habitat {
            rng: ChaCha12Rng::seed_from_u64(seed),
            headings: HashMap::new(),
        }
    }

    fn tick(&mut self, manager: &mut PopulationManager) -> Result<StepInput, PopulationError> {
        let world = manager.settings().world_size;
        let top_speed = manager.settings().genome.max_speed.max;
        let mut updates = Vec::with_capacity(manager.num_living());
        for specimen in manager.living() {
            let heading = self
                .headings
                .entry(specimen.id())
                .or_insert_with(|| self.rng.random_range(0.0..TAU));
            *heading += self.rng.random_range(-0.4..0.4);
            let speed = specimen.genome().max_speed() * self.rng.random_range(0.25..1.0);

            let moved = specimen.position() + Vector2::new(heading.cos(), heading.sin()) * speed;
            let position = Point2::new(moved.x.clamp(0.0, world), moved.y.clamp(0.0, world));
            let crossed_edge = position != moved;

            let food = manager
                .domain(specimen.domain())
                .and_then(|domain| domain.which_food_patch(position.x, position.y))
                .map_or(0.0, |_| FOOD_ENERGY);
            let cost = map_range(speed, 0.0, top_speed, 0.1, 0.6) * specimen.genome().size();

            updates.push((
                specimen.id(),
                Vitals {
                    energy: (specimen.energy() - cost + food).min(specimen.max_energy()),
                    max_energy: specimen.max_energy(),
                    position,
                    distance_moved: distance(&specimen.position(), &position),
                    food_energy: food,
                    killed_in_fight: false,
                    crossed_edge,
                },
            ));
        }

        let mut paired = vec![false; updates.len()];
        let mut encounters = Vec::new();
        for i in 0..updates.len() {
            for j in i + 1..updates.len() {
                if paired[i] || paired[j] {
                    continue;
                }
                if distance(&updates[i].1.position, &updates[j].1.position) < ENCOUNTER_RADIUS {
                    paired[i] = true;
                    paired[j] = true;
                    encounters.push((updates[i].0, updates[j].0));
                }
            }
        }

        for (id, vitals) in &updates {
            manager.update_vitals(*id, vitals)?;
        }
        Ok(StepInput { encounters })
    }

    fn forget_dead(&mut self, manager: &PopulationManager) {
        self.headings.retain(|id, _| manager.specimen(*id).is_some());
    }
}

fn run() -> Result<(), Box<dyn Error>> {
    let mut args = env::args().skip(1);
    let settings = match args.next() {
        Some(path) if path != "-" => Settings::load(&path)?,
        _ => Settings::default(),
    };
    let steps: u64 = match args.next() {
        Some(steps) => steps.parse()?,
        None => 2000,
    };
    let log_path = args.next();

    let seed = settings.seed;
    let mut manager = PopulationManager::new(settings)?;
    if let Some(path) = log_path {
        let log = BirthsDeathsLog::new(BufWriter::new(File::create(&path)?))?;
        manager = manager.with_event_sink(log);
        info!(path = %path, "writing births and deaths");
    }
    for index in 0..manager.domains().len() {
        if let Some(domain) = manager.domain_mut(index) {
            let extent = domain.end() - domain.start();
            let patch = RectPatch::new(
                center(&domain.start(), &domain.end()),
                extent.x / 4.0,
                extent.y / 4.0,
            );
            domain.add_food_patch(Box::new(patch));
        }
    }

    manager.seed_initial()?;
    let mut habitat = Habitat::new(seed.wrapping_add(1));
    info!(steps, rules = manager.rules_name(), "simulation started");
    for _ in 0..steps {
        let input = habitat.tick(&mut manager)?;
        let report = manager.step(&input)?;
        habitat.forget_dead(&manager);
        if report.step % REPORT_INTERVAL == 0 {
            let counters = manager.counters();
            info!(
                step = report.step,
                living = manager.num_living(),
                born = counters.born,
                created = counters.total_created(),
                died = counters.total_died(),
                "progress"
            );
        }
    }
    manager.finish()?;

    let status = manager.status();
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn main() -> ExitCode {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::INFO)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::FAILURE
        }
    }
}
