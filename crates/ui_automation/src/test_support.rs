//! Scriptable in-memory bridge for unit tests.
//!
//! Dumps and activities are consumed in order; the last entry repeats once
//! the script runs out, which models a device whose screen stopped
//! changing. Executed shell commands are recorded verbatim for assertions.

use crate::bridge::{DeviceBridge, ForegroundActivity};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    dumps: Vec<String>,
    dump_cursor: usize,
    activities: Vec<Option<String>>,
    activity_cursor: usize,
    executed: Vec<String>,
}

#[derive(Default)]
pub(crate) struct FakeBridge {
    state: Mutex<FakeState>,
}

impl FakeBridge {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_dumps(self, dumps: Vec<&str>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.dumps = dumps.into_iter().map(String::from).collect();
        }
        self
    }

    pub fn with_activities(self, activities: Vec<Option<&str>>) -> Self {
        {
            let mut state = self.state.lock().unwrap();
            state.activities = activities
                .into_iter()
                .map(|a| a.map(String::from))
                .collect();
        }
        self
    }

    /// How many hierarchy dumps were requested
    pub fn dump_count(&self) -> usize {
        self.state.lock().unwrap().dump_cursor
    }

    /// Every shell command executed, in order
    pub fn executed(&self) -> Vec<String> {
        self.state.lock().unwrap().executed.clone()
    }
}

fn advance<T: Clone>(items: &[T], cursor: &mut usize) -> Option<T> {
    if items.is_empty() {
        return None;
    }
    let index = (*cursor).min(items.len() - 1);
    *cursor += 1;
    Some(items[index].clone())
}

#[async_trait]
impl DeviceBridge for FakeBridge {
    async fn execute(&self, _device_id: &str, command: &str, _timeout: Duration) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        state.executed.push(command.to_string());
        Ok(String::new())
    }

    async fn dump_hierarchy(&self, _device_id: &str) -> Result<String> {
        let mut state = self.state.lock().unwrap();
        let mut cursor = state.dump_cursor;
        let dump = advance(&state.dumps, &mut cursor).unwrap_or_default();
        state.dump_cursor = cursor;
        Ok(dump)
    }

    async fn foreground_activity(&self, _device_id: &str) -> Result<Option<ForegroundActivity>> {
        let mut state = self.state.lock().unwrap();
        let mut cursor = state.activity_cursor;
        let observed = advance(&state.activities, &mut cursor).flatten();
        state.activity_cursor = cursor;
        Ok(observed.map(|component| {
            let package = component
                .split('/')
                .next()
                .unwrap_or(component.as_str())
                .to_string();
            ForegroundActivity {
                package,
                component: Some(component),
            }
        }))
    }

    async fn screen_size(&self, _device_id: &str) -> Result<(u32, u32)> {
        Ok((1080, 2400))
    }
}
