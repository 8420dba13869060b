//! Controller: the registry of strips and areas built from the config.
//!
//! Strips are created first because areas refer to them by id. Each area
//! sits behind its own async mutex, so a slow mode change on one area never
//! blocks another. Status and power are read from each area's `AreaWatch`
//! and never wait on a transition. `shutdown()` stops every area and drops
//! the sinks.

use crate::Color;
use crate::area::{Area, AreaError, AreaStatus, AreaWatch};
use crate::calculator::CalculatorReport;
use crate::config::{Config, ConfigError, StripConfig};
use crate::strip::{MockStrip, StripSink};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// A configured strip and the sink that drives it.
struct StripEntry {
    config: StripConfig,
    sink: Arc<dyn StripSink>,
}

struct AreaEntry {
    area: Arc<Mutex<Area>>,
    watch: AreaWatch,
}

/// An area's calculator as reported over the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct ActiveCalculator {
    #[schema(example = "living_room")]
    pub area: String,
    /// Null while the area is off
    pub calculator: Option<CalculatorReport>,
}

/// Strip as reported over the API.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, utoipa::ToSchema)]
pub struct StripStatus {
    #[serde(flatten)]
    pub config: StripConfig,
    /// Areas with at least one segment on this strip
    pub areas: Vec<String>,
}

pub struct Controller {
    strips: BTreeMap<String, StripEntry>,
    areas: BTreeMap<String, AreaEntry>,
}

impl Controller {
    /// Build from config using in-memory `MockStrip` sinks.
    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Self::with_sinks(config, |strip| -> Arc<dyn StripSink> {
            Arc::new(MockStrip::new(strip.count))
        })
    }

    /// Build from config, creating one sink per strip with `make_sink`.
    pub fn with_sinks<F>(config: &Config, mut make_sink: F) -> Result<Self, ConfigError>
    where
        F: FnMut(&StripConfig) -> Arc<dyn StripSink>,
    {
        let mut strips = BTreeMap::new();
        for strip in &config.strips {
            if strips.contains_key(&strip.id) {
                return Err(ConfigError::DuplicateStrip(strip.id.clone()));
            }
            let entry = StripEntry {
                config: strip.clone(),
                sink: make_sink(strip),
            };
            tracing::debug!("Strip {}: {} pixels", strip.id, strip.count);
            strips.insert(strip.id.clone(), entry);
        }

        let mut areas = BTreeMap::new();
        for area_config in &config.areas {
            if areas.contains_key(&area_config.name) {
                return Err(ConfigError::DuplicateArea(area_config.name.clone()));
            }

            let mut area = Area::new(area_config.name.clone());
            for segment in &area_config.strips {
                let sink = match segment.strip_id() {
                    Some(id) => {
                        let entry = strips.get(id).ok_or_else(|| ConfigError::UnknownStrip {
                            area: area_config.name.clone(),
                            strip: id.to_string(),
                        })?;
                        Some((id.to_string(), entry.sink.clone()))
                    }
                    None => None,
                };
                let (start, end) = segment.bounds();
                area.add_segment(start, end, sink)
                    .map_err(|source| ConfigError::Segment {
                        area: area_config.name.clone(),
                        source,
                    })?;
            }

            tracing::info!(
                "Area {}: {} segments, {} pixels",
                area.name(),
                area.segments().len(),
                area.total_pixel_count()
            );
            let entry = AreaEntry {
                watch: area.watch(),
                area: Arc::new(Mutex::new(area)),
            };
            areas.insert(area_config.name.clone(), entry);
        }

        Ok(Self { strips, areas })
    }

    pub fn area(&self, name: &str) -> Option<Arc<Mutex<Area>>> {
        self.areas.get(name).map(|entry| entry.area.clone())
    }

    pub fn area_names(&self) -> impl Iterator<Item = &str> {
        self.areas.keys().map(String::as_str)
    }

    pub fn area_status(&self, name: &str) -> Option<AreaStatus> {
        self.areas.get(name).map(|entry| entry.watch.status())
    }

    pub fn area_statuses(&self) -> Vec<AreaStatus> {
        self.areas.values().map(|entry| entry.watch.status()).collect()
    }

    /// Calculator of one area; `None` means no such area.
    pub fn calculator(&self, name: &str) -> Option<Option<CalculatorReport>> {
        self.areas.get(name).map(|entry| entry.watch.calculator())
    }

    pub fn calculators(&self) -> Vec<ActiveCalculator> {
        self.areas
            .iter()
            .map(|(name, entry)| ActiveCalculator {
                area: name.clone(),
                calculator: entry.watch.calculator(),
            })
            .collect()
    }

    pub fn strip_statuses(&self) -> Vec<StripStatus> {
        let areas = self.area_statuses();
        self.strips
            .values()
            .map(|entry| StripStatus {
                config: entry.config.clone(),
                areas: areas
                    .iter()
                    .filter(|a| {
                        a.segments
                            .iter()
                            .any(|s| s.strip.as_deref() == Some(entry.config.id.as_str()))
                    })
                    .map(|a| a.name.clone())
                    .collect(),
            })
            .collect()
    }

    /// Change the mode of one area. `Ok(None)` means no such area.
    pub async fn set_mode(
        &self,
        area: &str,
        mode: &str,
        color1: Option<Color>,
        color2: Option<Color>,
    ) -> Result<Option<()>, AreaError> {
        let Some(area) = self.area(area) else {
            return Ok(None);
        };
        area.lock().await.set_mode(mode, color1, color2).await?;
        Ok(Some(()))
    }

    /// True while any area shows something.
    pub fn power(&self) -> bool {
        self.areas.values().any(|entry| !entry.watch.is_black())
    }

    /// Stop every area and blank its strips.
    pub async fn stop_all(&self) {
        for (name, entry) in &self.areas {
            tracing::info!("Stopping area {}", name);
            entry.area.lock().await.stop().await;
        }
    }

    /// Stop every area, then release the strips.
    pub async fn shutdown(self) {
        self.stop_all().await;
        let Self { strips, areas } = self;
        drop(areas);
        for (id, entry) in strips {
            tracing::debug!("Releasing strip {} ({} pixels)", id, entry.sink.len());
        }
        tracing::info!("All areas stopped, strips released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AreaConfig, SegmentConfig};
    use pretty_assertions::assert_eq;

    fn strip(id: &str, count: usize) -> StripConfig {
        StripConfig {
            id: id.to_string(),
            count,
            gpio: None,
            power_gpio: None,
            brightness: None,
        }
    }

    fn area(name: &str, strips: Vec<SegmentConfig>) -> AreaConfig {
        AreaConfig {
            name: name.to_string(),
            strips,
        }
    }

    fn sample() -> Config {
        Config {
            strips: vec![strip("desk", 10), strip("shelf", 5)],
            areas: vec![
                area(
                    "desk",
                    vec![
                        SegmentConfig::Wired(0, 10, "desk".to_string()),
                        SegmentConfig::Placeholder(0, 3),
                    ],
                ),
                area("shelf", vec![SegmentConfig::Wired(4, 0, "shelf".to_string())]),
            ],
        }
    }

    #[tokio::test]
    async fn builds_areas_on_shared_strips() {
        let controller = Controller::from_config(&sample()).unwrap();

        assert_eq!(controller.area_names().collect::<Vec<_>>(), vec!["desk", "shelf"]);
        let statuses = controller.area_statuses();
        assert_eq!(statuses[0].total_pixel_count, 13);
        assert_eq!(statuses[1].total_pixel_count, 4);

        let strips = controller.strip_statuses();
        assert_eq!(strips[0].config.id, "desk");
        assert_eq!(strips[0].areas, vec!["desk".to_string()]);
    }

    #[test]
    fn unknown_strip_is_rejected() {
        let mut config = sample();
        config.areas[1].strips.push(SegmentConfig::Wired(0, 2, "garage".to_string()));
        let err = Controller::from_config(&config).err().unwrap();
        assert!(matches!(err, ConfigError::UnknownStrip { ref strip, .. } if strip == "garage"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let mut config = sample();
        config.strips.push(strip("desk", 1));
        assert!(matches!(
            Controller::from_config(&config).err(),
            Some(ConfigError::DuplicateStrip(_))
        ));

        let mut config = sample();
        config.areas.push(area("desk", vec![]));
        assert!(matches!(
            Controller::from_config(&config).err(),
            Some(ConfigError::DuplicateArea(_))
        ));
    }

    #[test]
    fn invalid_segment_fails_the_build() {
        let mut config = sample();
        config.areas[0].strips.push(SegmentConfig::Placeholder(-2, 4));
        assert!(matches!(
            Controller::from_config(&config).err(),
            Some(ConfigError::Segment { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn power_follows_area_modes() {
        let controller = Controller::from_config(&sample()).unwrap();
        assert!(!controller.power());

        let set = controller.set_mode("shelf", "fire", None, None).await;
        assert_eq!(set, Ok(Some(())));
        assert!(controller.power());

        let missing = controller.set_mode("garage", "fire", None, None).await;
        assert_eq!(missing, Ok(None));

        controller.set_mode("shelf", "black", None, None).await.unwrap();
        assert!(!controller.power());

        controller.set_mode("desk", "test", None, None).await.unwrap();
        assert!(controller.power());
        controller.stop_all().await;
        assert!(!controller.power());
    }

    #[tokio::test(start_paused = true)]
    async fn status_reads_do_not_wait_for_a_switch() {
        let controller = Arc::new(Controller::from_config(&sample()).unwrap());
        controller.set_mode("desk", "test", None, None).await.unwrap();
        controller.set_mode("shelf", "color", None, None).await.unwrap();

        let switching = controller.clone();
        let switch = tokio::spawn(async move {
            switching.set_mode("desk", "fire", None, None).await
        });
        // Mid-switch: desk holds its lock through the settle delay
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(controller.area("desk").unwrap().try_lock().is_err());

        let statuses = controller.area_statuses();
        assert_eq!(statuses[0].mode, "black");
        assert_eq!(statuses[1].mode, "color");
        assert!(controller.power());
        assert_eq!(controller.calculator("desk"), Some(None));

        assert_eq!(switch.await.unwrap(), Ok(Some(())));
        assert_eq!(controller.area_status("desk").map(|s| s.mode), Some("fire".to_string()));
        controller.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn calculators_list_every_area() {
        let controller = Controller::from_config(&sample()).unwrap();
        controller.set_mode("shelf", "color", Some(Color::GREEN), None).await.unwrap();

        let calculators = controller.calculators();
        assert_eq!(calculators.len(), 2);
        assert_eq!(calculators[0].area, "desk");
        assert_eq!(calculators[0].calculator, None);
        let shelf = calculators[1].calculator.as_ref().unwrap();
        assert_eq!(shelf.variant, "color");
        assert_eq!(shelf.frame, vec!["#00FF00".to_string(); 4]);

        assert_eq!(controller.calculator("garage"), None);
        controller.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_blanks_every_strip() {
        let desk = Arc::new(MockStrip::new(10));
        let shelf = Arc::new(MockStrip::new(5));
        let (d, s) = (desk.clone(), shelf.clone());
        let controller = Controller::with_sinks(&sample(), move |cfg| -> Arc<dyn StripSink> {
            let strip = if cfg.id == "desk" { d.clone() } else { s.clone() };
            strip
        })
        .unwrap();

        controller.set_mode("desk", "color", Some(Color::BLUE), None).await.unwrap();
        controller.set_mode("shelf", "color", None, None).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(400)).await;
        assert_eq!(desk.shown(), vec![Color::BLUE; 10]);
        // 4..0 walks 4, 3, 2, 1
        assert_eq!(&shelf.shown()[1..5], &[Color::RED; 4]);
        assert_eq!(shelf.shown()[0], Color::BLACK);

        controller.shutdown().await;
        assert_eq!(desk.shown(), vec![Color::BLACK; 10]);
        assert_eq!(shelf.shown(), vec![Color::BLACK; 5]);
    }
}
