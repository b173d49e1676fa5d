use std::path::Path;
use std::sync::mpsc;
use std::time::Duration;

use log::*;
use notify::{Event, RecursiveMode, Watcher};

/// Editors emit bursts of events per save; wait this long after the
/// first one before draining the rest.
const SETTLE_DELAY: Duration = Duration::from_millis(50);

pub struct SourceChanges {
    #[expect(unused)]
    watcher: notify::RecommendedWatcher,
    receiver: mpsc::Receiver<notify::Result<Event>>,
}

impl SourceChanges {
    /// Blocks until at least one relevant shader source event arrives,
    /// then drains whatever else has queued up behind it.
    pub fn wait(&mut self) -> anyhow::Result<Vec<Event>> {
        loop {
            let first = self.receiver.recv()??;

            std::thread::sleep(SETTLE_DELAY);

            let mut events = vec![first];
            for event in self.receiver.try_iter() {
                events.push(event?);
            }

            events.retain(relevant);
            if !events.is_empty() {
                return Ok(events);
            }
        }
    }
}

fn relevant(event: &Event) -> bool {
    match event.kind {
        notify::EventKind::Create(_) => true,
        notify::EventKind::Modify(_) => true,
        notify::EventKind::Remove(_) => true,

        notify::EventKind::Access(_) => false,
        notify::EventKind::Any | notify::EventKind::Other => {
            error!("unexpected notify event: {event:?}");
            false
        }
    }
}

pub fn watch(shaders_dir: &Path) -> notify::Result<SourceChanges> {
    let (sender, receiver) = mpsc::channel::<notify::Result<Event>>();

    let mut watcher = notify::recommended_watcher(sender)?;
    watcher.watch(shaders_dir, RecursiveMode::NonRecursive)?;

    Ok(SourceChanges { watcher, receiver })
}
