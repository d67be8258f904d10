//! Position reports drawn as map placemarks.

use crate::protocol::CallbackHandler;
use applib_core::Request;
use serde_json::Value;
use std::collections::VecDeque;

pub const POSREP_QUERY: &str = "select * from pos_reps ORDER BY ts DESC, id ASC limit 20;";
pub const POSREP_CALLBACK: &str = "show_posrep";

/// Placemarks kept on the layer; older ones are removed first.
pub const MAX_PLACEMARKS: usize = 20;
/// Metres above ground.
pub const PLACEMARK_ALTITUDE: f64 = 100.0;

/// The periodic query whose replies feed [`PlacemarkWindow`].
pub fn posrep_request() -> Request {
    Request::query_constant(POSREP_QUERY, POSREP_CALLBACK)
}

#[derive(Debug, Clone, PartialEq)]
pub struct Placemark {
    /// Shown as both display name and label.
    pub id: String,
    pub lat: f64,
    pub lon: f64,
    pub altitude: f64,
}

impl Placemark {
    /// Build from a `pos_reps` row. Coordinates may arrive as numbers or
    /// numeric strings.
    pub fn from_row(row: &Value) -> Option<Self> {
        let id = match row.get("id")? {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return None,
        };
        Some(Self {
            id,
            lat: coordinate(row.get("lat")?)?,
            lon: coordinate(row.get("lon")?)?,
            altitude: PLACEMARK_ALTITUDE,
        })
    }
}

fn coordinate(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Map rendering collaborator.
pub trait MapLayer: Send {
    fn add_placemark(&mut self, handle: u64, placemark: &Placemark);
    fn remove_placemark(&mut self, handle: u64);
}

/// Sliding window of the most recent placemarks on a [`MapLayer`].
pub struct PlacemarkWindow<L> {
    layer: L,
    shown: VecDeque<u64>,
    next_handle: u64,
}

impl<L: MapLayer> PlacemarkWindow<L> {
    pub fn new(layer: L) -> Self {
        Self {
            layer,
            shown: VecDeque::new(),
            next_handle: 0,
        }
    }

    pub fn layer(&self) -> &L {
        &self.layer
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    /// Add every usable row of `data`, then trim to [`MAX_PLACEMARKS`].
    /// Returns the number of rows added.
    pub fn show(&mut self, data: &Value) -> usize {
        let Some(rows) = data.as_array() else {
            tracing::warn!("show_posrep expects an array of rows, got {}", data);
            return 0;
        };

        let mut added = 0;
        for row in rows {
            let Some(placemark) = Placemark::from_row(row) else {
                tracing::debug!("Skipping position report without id/lat/lon: {}", row);
                continue;
            };
            let handle = self.next_handle;
            self.next_handle += 1;
            self.layer.add_placemark(handle, &placemark);
            self.shown.push_back(handle);
            added += 1;
        }

        while self.shown.len() > MAX_PLACEMARKS {
            if let Some(oldest) = self.shown.pop_front() {
                self.layer.remove_placemark(oldest);
            }
        }
        added
    }
}

impl<L: MapLayer + 'static> PlacemarkWindow<L> {
    /// Wrap the window as the handler for [`POSREP_CALLBACK`].
    pub fn into_handler(mut self) -> CallbackHandler {
        Box::new(move |data: &Value| {
            self.show(data);
        })
    }
}
