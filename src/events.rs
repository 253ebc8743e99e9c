//! Outbound lifecycle events and the sinks that persist them.

use std::io::{self, Write};

use serde::Serialize;

use crate::ledger::RankedFitness;
use crate::specimen::{DeathCause, SpecimenId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CreationOrigin {
    Seed,
    Random,
    Tournament,
    FittestPair,
    FittestSingle,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum LifecycleEvent {
    Birth {
        step: u64,
        child: SpecimenId,
        parents: (SpecimenId, SpecimenId),
        domain: usize,
    },
    Creation {
        step: u64,
        id: SpecimenId,
        domain: usize,
        origin: CreationOrigin,
    },
    Death {
        step: u64,
        id: SpecimenId,
        domain: usize,
        cause: DeathCause,
    },
}

impl LifecycleEvent {
    pub fn step(&self) -> u64 {
        match *self {
            LifecycleEvent::Birth { step, .. }
            | LifecycleEvent::Creation { step, .. }
            | LifecycleEvent::Death { step, .. } => step,
        }
    }

    /// Births and creations both add a specimen to the world.
    pub fn is_inflow(&self) -> bool {
        !matches!(self, LifecycleEvent::Death { .. })
    }
}

/// Which ranked ledger a snapshot was taken from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerKind {
    BestSoFar,
    BestRecent,
    Domain(usize),
}

pub trait EventSink {
    fn record(&mut self, event: &LifecycleEvent) -> io::Result<()>;

    fn fitness_snapshot(
        &mut self,
        _step: u64,
        _kind: LedgerKind,
        _ranked: &[RankedFitness],
    ) -> io::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn record(&mut self, _event: &LifecycleEvent) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps everything in memory.
#[derive(Debug, Default, Clone)]
pub struct EventBuffer {
    pub events: Vec<LifecycleEvent>,
    pub snapshots: Vec<(u64, LedgerKind, Vec<RankedFitness>)>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn births(&self) -> impl Iterator<Item = &LifecycleEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, LifecycleEvent::Birth { .. }))
    }

    pub fn deaths(&self) -> impl Iterator<Item = &LifecycleEvent> {
        self.events
            .iter()
            .filter(|e| matches!(e, LifecycleEvent::Death { .. }))
    }

    pub fn at_step(&self, step: u64) -> impl Iterator<Item = &LifecycleEvent> {
        self.events.iter().filter(move |e| e.step() == step)
    }
}

impl EventSink for EventBuffer {
    fn record(&mut self, event: &LifecycleEvent) -> io::Result<()> {
        self.events.push(*event);
        Ok(())
    }

    fn fitness_snapshot(
        &mut self,
        step: u64,
        kind: LedgerKind,
        ranked: &[RankedFitness],
    ) -> io::Result<()> {
        self.snapshots.push((step, kind, ranked.to_vec()));
        Ok(())
    }
}

/// Writes the `BirthsDeaths.log` format.
pub struct BirthsDeathsLog<W: Write> {
    out: W,
}

impl<W: Write> BirthsDeathsLog<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "% Timestep Event Agent# Parent1 Parent2")?;
        Ok(BirthsDeathsLog { out })
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write> EventSink for BirthsDeathsLog<W> {
    fn record(&mut self, event: &LifecycleEvent) -> io::Result<()> {
        match *event {
            LifecycleEvent::Birth {
                step,
                child,
                parents: (first, second),
                ..
            } => writeln!(self.out, "{step} BIRTH {child} {first} {second}"),
            LifecycleEvent::Creation { step, id, .. } => writeln!(self.out, "{step} CREATION {id}"),
            LifecycleEvent::Death { step, id, .. } => writeln!(self.out, "{step} DEATH {id}"),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        self.out.flush()
    }
}

/// Aggregates events per step into `<timestep> <numDeaths> <numBirths>` lines.
///
/// A step is written once a later step is seen, or on flush. Steps without
/// events are omitted.
pub struct LockstepRecorder<W: Write> {
    out: W,
    pending: Option<(u64, usize, usize)>,
}

impl<W: Write> LockstepRecorder<W> {
    pub fn new(mut out: W) -> io::Result<Self> {
        writeln!(out, "% timestep numDeaths numBirths")?;
        Ok(LockstepRecorder { out, pending: None })
    }

    fn write_pending(&mut self) -> io::Result<()> {
        if let Some((step, deaths, births)) = self.pending.take() {
            writeln!(self.out, "{step} {deaths} {births}")?;
        }
        Ok(())
    }

    pub fn into_inner(mut self) -> io::Result<W> {
        self.write_pending()?;
        Ok(self.out)
    }
}

impl<W: Write> EventSink for LockstepRecorder<W> {
    fn record(&mut self, event: &LifecycleEvent) -> io::Result<()> {
        let step = event.step();
        if self.pending.is_some_and(|(pending, _, _)| pending != step) {
            self.write_pending()?;
        }
        let (_, deaths, births) = self.pending.get_or_insert((step, 0, 0));
        if event.is_inflow() {
            *births += 1;
        } else {
            *deaths += 1;
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.write_pending()?;
        self.out.flush()
    }
}

impl EventSink for Vec<Box<dyn EventSink>> {
    fn record(&mut self, event: &LifecycleEvent) -> io::Result<()> {
        self.iter_mut().try_for_each(|sink| sink.record(event))
    }

    fn fitness_snapshot(
        &mut self,
        step: u64,
        kind: LedgerKind,
        ranked: &[RankedFitness],
    ) -> io::Result<()> {
        self.iter_mut()
            .try_for_each(|sink| sink.fitness_snapshot(step, kind, ranked))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.iter_mut().try_for_each(|sink| sink.flush())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn events() -> Vec<LifecycleEvent> {
        vec![
            LifecycleEvent::Creation {
                step: 0,
                id: SpecimenId(1),
                domain: 0,
                origin: CreationOrigin::Random,
            },
            LifecycleEvent::Birth {
                step: 3,
                child: SpecimenId(4),
                parents: (SpecimenId(1), SpecimenId(2)),
                domain: 0,
            },
            LifecycleEvent::Death {
                step: 3,
                id: SpecimenId(2),
                domain: 0,
                cause: DeathCause::Age,
            },
            LifecycleEvent::Death {
                step: 7,
                id: SpecimenId(1),
                domain: 0,
                cause: DeathCause::Smite,
            },
        ]
    }

    #[test]
    fn births_deaths_log_lines() {
        let mut log = BirthsDeathsLog::new(Vec::new()).unwrap();
        for event in events() {
            log.record(&event).unwrap();
        }
        let text = String::from_utf8(log.into_inner()).unwrap();
        assert_eq!(
            text,
            "% Timestep Event Agent# Parent1 Parent2\n\
             0 CREATION 1\n\
             3 BIRTH 4 1 2\n\
             3 DEATH 2\n\
             7 DEATH 1\n"
        );
    }

    #[test]
    fn lockstep_recorder_aggregates_per_step() {
        let mut recorder = LockstepRecorder::new(Vec::new()).unwrap();
        for event in events() {
            recorder.record(&event).unwrap();
        }
        let text = String::from_utf8(recorder.into_inner().unwrap()).unwrap();
        let lines: Vec<_> = text.lines().skip(1).collect();
        assert_eq!(lines, vec!["0 0 1", "3 1 1", "7 1 0"]);
    }

    #[test]
    fn fan_out_reaches_every_sink() {
        let mut sinks: Vec<Box<dyn EventSink>> = vec![Box::new(NullSink), Box::new(EventBuffer::new())];
        for event in events() {
            sinks.record(&event).unwrap();
        }
        sinks.flush().unwrap();
        assert_eq!(sinks.len(), 2);
    }

    #[test]
    fn buffer_filters() {
        let mut buffer = EventBuffer::new();
        for event in events() {
            buffer.record(&event).unwrap();
        }
        assert_eq!(buffer.births().count(), 1);
        assert_eq!(buffer.deaths().count(), 2);
        assert_eq!(buffer.at_step(3).count(), 2);
    }
}
