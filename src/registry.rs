use std::collections::HashMap;
use chrono::Utc;
use log::{debug, info};
use tokio::sync::mpsc::UnboundedSender;
use crate::data::{ContainerRecord, ContainerSummary, History, LifecycleEvent, Origin};

/// Containers the agent currently believes to be running.
///
/// Membership only changes through `bulk_load`, `on_start` and `on_stop`.
/// Every newly tracked id is sent to the watch port so that a stats
/// subscription can be opened for it.
pub struct Registry {
    containers: HashMap<String, ContainerRecord>,
    history:    Vec<History>,
    watch:      UnboundedSender<String>,
}

impl Registry {
    pub fn new(watch: UnboundedSender<String>) -> Self {
        Self {
            containers: HashMap::new(),
            history:    Vec::new(),
            watch:      watch,
        }
    }

    pub fn bulk_load(&mut self, containers: Vec<ContainerSummary>) {
        for container in containers {
            if container.state != "running" || self.is_known(&container.id) {
                continue;
            }

            debug!("adding container {}", container.id);

            self.insert(ContainerRecord {
                id:         container.id.clone(),
                name:       container.name().to_owned(),
                image:      container.image.clone(),
                started_at: container.created.unwrap_or_else(Utc::now),
                origin:     Origin::BulkSnapshot,
            });
        }
    }

    pub fn on_start(&mut self, event: &LifecycleEvent) {
        if !self.is_known(&event.id) {
            info!("container {} started", event.id);

            self.insert(ContainerRecord {
                id:         event.id.clone(),
                name:       event.name().to_owned(),
                image:      event.from.clone(),
                started_at: event.time,
                origin:     Origin::LifecycleEvent,
            });
        }

        self.history.push(History {
            time: event.time,
            id:   event.id.clone(),
        });
    }

    pub fn on_stop(&mut self, id: &str) -> bool {
        let removed = self.containers.remove(id).is_some();
        if removed {
            info!("container {} removed", id);
        }
        removed
    }

    pub fn is_known(&self, id: &str) -> bool {
        self.containers.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&ContainerRecord> {
        self.containers.get(id)
    }

    pub fn ids(&self) -> Vec<String> {
        self.containers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.containers.is_empty()
    }

    pub fn history(&self) -> &[History] {
        &self.history
    }

    fn insert(&mut self, record: ContainerRecord) {
        let id = record.id.clone();
        self.containers.insert(id.clone(), record);

        if self.watch.send(id).is_err() {
            debug!("stats watch closed");
        }
    }
}
