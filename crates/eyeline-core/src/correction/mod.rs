//! Interactive correction of eye points.
//!
//! Input arrives as discrete [`InputEvent`] values and every session exposes a
//! `step` transition, so a whole correction can be replayed from a script
//! without a display. [`run`] drives a session against any
//! [`CorrectionSurface`] until the operator commits or quits.

mod coarse;
mod fine;

pub use coarse::CoarseSession;
pub use fine::{FineSession, FineSettings, CROSSHAIR_STYLES};

use crate::types::{Outcome, Point};

/// Pointer button that produced an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Button {
    Primary,
    Secondary,
}

/// Keys the correction sessions understand. Their meaning depends on the mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    Up,
    Down,
    Left,
    Right,
    Tab,
    Space,
    Escape,
    Char(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputEvent {
    PointerDown { button: Button, x: i32, y: i32 },
    PointerMove { x: i32, y: i32 },
    PointerUp { button: Button, x: i32, y: i32 },
    Key(Key),
}

/// Result of feeding one event into a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// State may have changed; keep going.
    Continue,
    /// The input was declined; state is unchanged.
    Rejected,
    /// The operator accepted the current state.
    Done,
    /// The operator asked to quit the whole run.
    Cancelled,
}

/// A correction state machine.
pub trait Correction {
    fn step(&mut self, event: &InputEvent) -> Step;
}

/// Display plus event source for one correction session.
pub trait CorrectionSurface<S> {
    type Error;

    /// Show the current state. Called before every blocking read.
    fn present(&mut self, state: &S) -> Result<(), Self::Error>;

    /// Block until the next input event.
    fn next_event(&mut self) -> Result<InputEvent, Self::Error>;
}

/// Drive `session` until it is committed or cancelled.
pub fn run<S, V>(session: &mut S, surface: &mut V) -> Result<Outcome<()>, V::Error>
where
    S: Correction,
    V: CorrectionSurface<S>,
{
    loop {
        surface.present(session)?;
        let event = surface.next_event()?;
        match session.step(&event) {
            Step::Continue => {}
            Step::Rejected => tracing::debug!(?event, "input rejected"),
            Step::Done => return Ok(Outcome::Committed(())),
            Step::Cancelled => return Ok(Outcome::Cancelled),
        }
    }
}

/// Eye points kept sorted ascending by x after every mutation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EyeList {
    points: Vec<Point>,
}

impl EyeList {
    pub fn new(points: impl IntoIterator<Item = Point>) -> Self {
        let mut list = Self {
            points: points.into_iter().collect(),
        };
        list.sort();
        list
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn get(&self, index: usize) -> Option<Point> {
        self.points.get(index).copied()
    }

    /// Insert at `index` (clamped to the end), re-sort and return where the point landed.
    pub fn insert(&mut self, index: usize, point: Point) -> Relocation {
        let index = index.min(self.points.len());
        self.points.insert(index, point);
        let moved = self.sort();
        Relocation {
            moved,
            placed: Some(index),
        }
    }

    /// Overwrite the point at `index` and re-sort.
    pub fn set(&mut self, index: usize, point: Point) -> Relocation {
        match self.points.get_mut(index) {
            Some(slot) => {
                *slot = point;
                let moved = self.sort();
                Relocation {
                    moved,
                    placed: Some(index),
                }
            }
            None => Relocation::unchanged(self.points.len()),
        }
    }

    /// Remove the point at `index`. Remaining points keep their order.
    pub fn remove(&mut self, index: usize) -> Option<Point> {
        (index < self.points.len()).then(|| self.points.remove(index))
    }

    /// Stable sort by x. Returns the new position of every old index.
    fn sort(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.points.len()).collect();
        order.sort_by_key(|&i| self.points[i].x);

        let mut moved = vec![0; order.len()];
        for (new, &old) in order.iter().enumerate() {
            moved[old] = new;
        }
        self.points = order.iter().map(|&i| self.points[i]).collect();
        moved
    }
}

/// Index bookkeeping after an [`EyeList`] mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relocation {
    moved: Vec<usize>,
    placed: Option<usize>,
}

impl Relocation {
    fn unchanged(len: usize) -> Self {
        Self {
            moved: (0..len).collect(),
            placed: None,
        }
    }

    /// New index of a point that sat at `old` before the mutation.
    pub fn follow(&self, old: usize) -> Option<usize> {
        self.moved.get(old).copied()
    }

    /// New index of the point that was inserted or overwritten.
    pub fn placed(&self) -> Option<usize> {
        self.placed.and_then(|i| self.follow(i))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Scripted<S> {
        events: std::vec::IntoIter<InputEvent>,
        presented: usize,
        _state: std::marker::PhantomData<S>,
    }

    impl<S> Scripted<S> {
        fn new(events: Vec<InputEvent>) -> Self {
            Self {
                events: events.into_iter(),
                presented: 0,
                _state: std::marker::PhantomData,
            }
        }
    }

    impl<S> CorrectionSurface<S> for Scripted<S> {
        type Error = &'static str;

        fn present(&mut self, _state: &S) -> Result<(), Self::Error> {
            self.presented += 1;
            Ok(())
        }

        fn next_event(&mut self) -> Result<InputEvent, Self::Error> {
            self.events.next().ok_or("script exhausted")
        }
    }

    struct Counter {
        seen: usize,
    }

    impl Correction for Counter {
        fn step(&mut self, event: &InputEvent) -> Step {
            self.seen += 1;
            match event {
                InputEvent::Key(Key::Char('q')) => Step::Cancelled,
                InputEvent::Key(Key::Space) => Step::Done,
                InputEvent::Key(Key::Char('r')) => Step::Rejected,
                _ => Step::Continue,
            }
        }
    }

    #[test]
    fn test_eyelist_sorted_on_construction() {
        let list = EyeList::new([Point::new(30, 1), Point::new(10, 2)]);
        assert_eq!(list.points(), &[Point::new(10, 2), Point::new(30, 1)]);
    }

    #[test]
    fn test_eyelist_set_reports_relocation() {
        let mut list = EyeList::new([Point::new(10, 0), Point::new(20, 0)]);
        let moved = list.set(0, Point::new(50, 0));
        assert_eq!(list.points(), &[Point::new(20, 0), Point::new(50, 0)]);
        assert_eq!(moved.placed(), Some(1));
        assert_eq!(moved.follow(1), Some(0));
    }

    #[test]
    fn test_eyelist_insert_sorts_and_tracks() {
        let mut list = EyeList::new([Point::new(100, 0)]);
        let moved = list.insert(0, Point::new(300, 0));
        assert_eq!(list.points(), &[Point::new(100, 0), Point::new(300, 0)]);
        assert_eq!(moved.placed(), Some(1));
    }

    #[test]
    fn test_eyelist_set_out_of_range_is_noop() {
        let mut list = EyeList::new([Point::new(5, 5)]);
        let moved = list.set(3, Point::new(0, 0));
        assert_eq!(moved.placed(), None);
        assert_eq!(list.points(), &[Point::new(5, 5)]);
    }

    #[test]
    fn test_run_stops_on_commit() {
        let mut counter = Counter { seen: 0 };
        let mut surface = Scripted::new(vec![
            InputEvent::Key(Key::Char('r')),
            InputEvent::PointerMove { x: 1, y: 1 },
            InputEvent::Key(Key::Space),
            InputEvent::Key(Key::Char('q')),
        ]);
        let outcome = run(&mut counter, &mut surface).unwrap();
        assert_eq!(outcome, Outcome::Committed(()));
        assert_eq!(counter.seen, 3);
        assert_eq!(surface.presented, 3);
    }

    #[test]
    fn test_run_propagates_cancel() {
        let mut counter = Counter { seen: 0 };
        let mut surface = Scripted::new(vec![InputEvent::Key(Key::Char('q'))]);
        assert!(run(&mut counter, &mut surface).unwrap().is_cancelled());
    }

    #[test]
    fn test_run_surfaces_source_errors() {
        let mut counter = Counter { seen: 0 };
        let mut surface = Scripted::new(vec![]);
        assert_eq!(run(&mut counter, &mut surface), Err("script exhausted"));
    }
}
