//! Map gestures in pixel space.
//!
//! The map renders to a canvas with no DOM-level pan or zoom API, so a
//! logical intent ("zoom in", "rotate clockwise") is translated into a
//! synthetic pointer sequence of defined magnitude, direction and step
//! count. The camera exposes its state through `data-*` attributes on the
//! map container; [`MapTelemetry`] reads them back so a test can assert the
//! gesture had the expected numeric effect.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::driver::{Driver, ElementState, MouseButton, PointerEvent};
use crate::locator::{BoundingBox, Point};
use crate::result::{E2eError, E2eResult};

/// Zoom level attribute
pub const ZOOM_ATTR: &str = "data-zoom-level";
/// Bearing attribute, degrees
pub const ROTATION_ATTR: &str = "data-map-rotation";
/// Camera position attribute, `"x,y,z"`
pub const CAMERA_ATTR: &str = "data-camera-position";

/// Wheel delta of one notch
pub const WHEEL_NOTCH: f64 = 100.0;

/// Default divisor for the gesture start point (map center)
pub const DEFAULT_DIVISOR: f64 = 2.0;

/// Default intermediate moves per drag
pub const DEFAULT_DRAG_STEPS: u32 = 20;

const EPSILON: f64 = 1e-6;

/// Gesture start point: `(x + width / divisor, y + height / divisor)`
#[must_use]
pub fn start_point(bbox: &BoundingBox, divisor: f64) -> Point {
    bbox.offset_point(divisor)
}

/// Linear interpolation from `from` to `to` in `steps` moves
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragPath {
    from: Point,
    to: Point,
    steps: u32,
}

impl DragPath {
    /// Build a path; fewer than one step is treated as one
    #[must_use]
    pub fn new(from: Point, to: Point, steps: u32) -> Self {
        Self {
            from,
            to,
            steps: steps.max(1),
        }
    }

    /// Number of intermediate points
    #[must_use]
    pub const fn steps(&self) -> u32 {
        self.steps
    }

    /// The points after `from`; the last one is exactly `to`
    #[must_use]
    pub fn points(&self) -> Vec<Point> {
        let n = f64::from(self.steps);
        (1..=self.steps)
            .map(|i| {
                if i == self.steps {
                    return self.to;
                }
                let t = f64::from(i) / n;
                Point::new(
                    self.from.x + (self.to.x - self.from.x) * t,
                    self.from.y + (self.to.y - self.from.y) * t,
                )
            })
            .collect()
    }
}

/// A logical map gesture
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Gesture {
    /// Scroll up `notches` wheel notches
    ZoomIn {
        /// Wheel notches
        notches: u32,
    },
    /// Scroll down `notches` wheel notches
    ZoomOut {
        /// Wheel notches
        notches: u32,
    },
    /// Left-drag by a pixel offset
    Pan {
        /// Horizontal pixels
        dx: f64,
        /// Vertical pixels
        dy: f64,
    },
    /// Right-drag horizontally; positive pixels rotate clockwise
    Rotate {
        /// Horizontal pixels
        pixels: f64,
    },
    /// Right-drag vertically; positive pixels tilt toward the horizon
    Tilt {
        /// Vertical pixels
        pixels: f64,
    },
}

/// Which telemetry a gesture must move, and in which direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedEffect {
    /// Zoom level strictly increases
    ZoomIncreases,
    /// Zoom level strictly decreases
    ZoomDecreases,
    /// Camera position changes
    CameraMoves,
    /// Rotation changes by a non-zero amount
    RotationChanges,
}

/// Pointer plan settings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GesturePlan {
    /// Divisor for the start point
    pub divisor: f64,
    /// Intermediate moves for drags
    pub steps: u32,
}

impl Default for GesturePlan {
    fn default() -> Self {
        Self {
            divisor: DEFAULT_DIVISOR,
            steps: DEFAULT_DRAG_STEPS,
        }
    }
}

impl Gesture {
    /// Pointer events for this gesture over a map of the given box
    #[must_use]
    pub fn plan(&self, bbox: &BoundingBox, plan: GesturePlan) -> Vec<PointerEvent> {
        let start = start_point(bbox, plan.divisor);
        let mut events = vec![PointerEvent::Move { point: start }];
        match *self {
            Self::ZoomIn { notches } | Self::ZoomOut { notches } => {
                let delta_y = if matches!(self, Self::ZoomIn { .. }) {
                    -WHEEL_NOTCH
                } else {
                    WHEEL_NOTCH
                };
                events.extend((0..notches).map(|_| PointerEvent::Wheel {
                    point: start,
                    delta_x: 0.0,
                    delta_y,
                }));
            }
            Self::Pan { dx, dy } => {
                events.extend(drag(start, start.offset(dx, dy), MouseButton::Left, plan.steps));
            }
            Self::Rotate { pixels } => {
                events.extend(drag(start, start.offset(pixels, 0.0), MouseButton::Right, plan.steps));
            }
            Self::Tilt { pixels } => {
                events.extend(drag(start, start.offset(0.0, -pixels), MouseButton::Right, plan.steps));
            }
        }
        events
    }

    /// What the camera must do afterwards
    #[must_use]
    pub const fn expected_effect(&self) -> ExpectedEffect {
        match self {
            Self::ZoomIn { .. } => ExpectedEffect::ZoomIncreases,
            Self::ZoomOut { .. } => ExpectedEffect::ZoomDecreases,
            Self::Pan { .. } | Self::Tilt { .. } => ExpectedEffect::CameraMoves,
            Self::Rotate { .. } => ExpectedEffect::RotationChanges,
        }
    }

    /// Check `before`/`after` telemetry against the expected effect
    pub fn verify(&self, before: &MapTelemetry, after: &MapTelemetry) -> E2eResult<TelemetryDelta> {
        let delta = after.delta(before);
        let ok = match self.expected_effect() {
            ExpectedEffect::ZoomIncreases => delta.zoom > EPSILON,
            ExpectedEffect::ZoomDecreases => delta.zoom < -EPSILON,
            ExpectedEffect::CameraMoves => delta.camera_moved(),
            ExpectedEffect::RotationChanges => delta.rotation.abs() > EPSILON,
        };
        if ok {
            Ok(delta)
        } else {
            Err(E2eError::assertion(
                format!("{self:?} effect"),
                format!("{:?}", self.expected_effect()),
                format!("{delta:?}"),
            ))
        }
    }
}

fn drag(from: Point, to: Point, button: MouseButton, steps: u32) -> Vec<PointerEvent> {
    let mut events = vec![PointerEvent::Down {
        point: from,
        button,
        click_count: 1,
    }];
    events.extend(
        DragPath::new(from, to, steps)
            .points()
            .into_iter()
            .map(|point| PointerEvent::Move { point }),
    );
    events.push(PointerEvent::Up {
        point: to,
        button,
        click_count: 1,
    });
    events
}

/// Dispatch a planned sequence with a pause between events
pub async fn perform(driver: &dyn Driver, events: &[PointerEvent], pause: Duration) -> E2eResult<()> {
    tracing::debug!(events = events.len(), "dispatching gesture");
    for event in events {
        driver.pointer(*event).await?;
        if !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    Ok(())
}

// =============================================================================
// TELEMETRY
// =============================================================================

/// Camera telemetry read from the map container
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapTelemetry {
    /// Zoom level
    pub zoom_level: f64,
    /// Bearing in degrees
    pub map_rotation: f64,
    /// Camera position
    pub camera_position: [f64; 3],
}

/// Difference between two telemetry samples
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TelemetryDelta {
    /// Zoom change
    pub zoom: f64,
    /// Rotation change normalized into (-180, 180]
    pub rotation: f64,
    /// Camera position change per axis
    pub camera: [f64; 3],
}

impl TelemetryDelta {
    /// Whether any camera axis moved
    #[must_use]
    pub fn camera_moved(&self) -> bool {
        self.camera.iter().any(|d| d.abs() > EPSILON)
    }

    /// Whether nothing changed
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.zoom.abs() <= EPSILON && self.rotation.abs() <= EPSILON && !self.camera_moved()
    }
}

impl MapTelemetry {
    /// Parse from an element's attributes
    pub fn from_state(state: &ElementState) -> E2eResult<Self> {
        let attr = |name: &str| {
            state.attributes.get(name).ok_or_else(|| E2eError::Decode {
                context: "map telemetry".into(),
                message: format!("missing attribute {name}"),
                body: format!("{:?}", state.attributes),
            })
        };
        Ok(Self {
            zoom_level: parse_number(ZOOM_ATTR, attr(ZOOM_ATTR)?)?,
            map_rotation: parse_number(ROTATION_ATTR, attr(ROTATION_ATTR)?)?,
            camera_position: parse_camera(attr(CAMERA_ATTR)?)?,
        })
    }

    /// `self - before`
    #[must_use]
    pub fn delta(&self, before: &Self) -> TelemetryDelta {
        let mut rotation = (self.map_rotation - before.map_rotation) % 360.0;
        if rotation > 180.0 {
            rotation -= 360.0;
        } else if rotation <= -180.0 {
            rotation += 360.0;
        }
        TelemetryDelta {
            zoom: self.zoom_level - before.zoom_level,
            rotation,
            camera: [
                self.camera_position[0] - before.camera_position[0],
                self.camera_position[1] - before.camera_position[1],
                self.camera_position[2] - before.camera_position[2],
            ],
        }
    }

    /// Render back into attribute form
    #[must_use]
    pub fn to_attributes(&self) -> Vec<(&'static str, String)> {
        let [x, y, z] = self.camera_position;
        vec![
            (ZOOM_ATTR, self.zoom_level.to_string()),
            (ROTATION_ATTR, self.map_rotation.to_string()),
            (CAMERA_ATTR, format!("{x},{y},{z}")),
        ]
    }
}

fn parse_number(name: &str, raw: &str) -> E2eResult<f64> {
    raw.trim().parse::<f64>().map_err(|e| E2eError::Decode {
        context: name.to_string(),
        message: e.to_string(),
        body: raw.to_string(),
    })
}

fn parse_camera(raw: &str) -> E2eResult<[f64; 3]> {
    let parts = raw
        .split(',')
        .map(|p| parse_number(CAMERA_ATTR, p))
        .collect::<E2eResult<Vec<f64>>>()?;
    <[f64; 3]>::try_from(parts).map_err(|parts| E2eError::Decode {
        context: CAMERA_ATTR.to_string(),
        message: format!("expected 3 components, got {}", parts.len()),
        body: raw.to_string(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn telemetry(zoom: f64, rotation: f64, camera: [f64; 3]) -> MapTelemetry {
        MapTelemetry {
            zoom_level: zoom,
            map_rotation: rotation,
            camera_position: camera,
        }
    }

    mod path_tests {
        use super::*;

        #[test]
        fn test_zero_steps_becomes_one() {
            let path = DragPath::new(Point::new(0.0, 0.0), Point::new(10.0, 0.0), 0);
            assert_eq!(path.points(), vec![Point::new(10.0, 0.0)]);
        }

        #[test]
        fn test_points_are_evenly_spaced() {
            let path = DragPath::new(Point::new(0.0, 0.0), Point::new(100.0, 50.0), 4);
            assert_eq!(
                path.points(),
                vec![
                    Point::new(25.0, 12.5),
                    Point::new(50.0, 25.0),
                    Point::new(75.0, 37.5),
                    Point::new(100.0, 50.0),
                ]
            );
        }

        proptest! {
            #[test]
            fn prop_last_point_is_target(
                fx in -2000.0f64..2000.0, fy in -2000.0f64..2000.0,
                tx in -2000.0f64..2000.0, ty in -2000.0f64..2000.0,
                steps in 0u32..200,
            ) {
                let to = Point::new(tx, ty);
                let points = DragPath::new(Point::new(fx, fy), to, steps).points();
                prop_assert_eq!(points.len() as u32, steps.max(1));
                prop_assert_eq!(*points.last().unwrap(), to);
            }

            #[test]
            fn prop_points_stay_inside_segment_box(
                fx in 0.0f64..1000.0, fy in 0.0f64..1000.0,
                tx in 0.0f64..1000.0, ty in 0.0f64..1000.0,
                steps in 1u32..50,
            ) {
                let (lo_x, hi_x) = (fx.min(tx) - 1e-9, fx.max(tx) + 1e-9);
                let (lo_y, hi_y) = (fy.min(ty) - 1e-9, fy.max(ty) + 1e-9);
                for p in DragPath::new(Point::new(fx, fy), Point::new(tx, ty), steps).points() {
                    prop_assert!(p.x >= lo_x && p.x <= hi_x);
                    prop_assert!(p.y >= lo_y && p.y <= hi_y);
                }
            }

            #[test]
            fn prop_start_point_inside_box(
                x in 0.0f64..500.0, y in 0.0f64..500.0,
                w in 1.0f64..2000.0, h in 1.0f64..2000.0,
                divisor in 1.0f64..16.0,
            ) {
                let bbox = BoundingBox::new(x, y, w, h);
                prop_assert!(bbox.contains(start_point(&bbox, divisor)));
            }
        }
    }

    mod plan_tests {
        use super::*;

        const MAP: BoundingBox = BoundingBox::new(0.0, 100.0, 1200.0, 800.0);

        #[test]
        fn test_zoom_in_scrolls_up_at_center() {
            let events = Gesture::ZoomIn { notches: 3 }.plan(&MAP, GesturePlan::default());
            assert_eq!(events.len(), 4);
            assert_eq!(events[0], PointerEvent::Move { point: Point::new(600.0, 500.0) });
            for e in &events[1..] {
                assert!(matches!(e, PointerEvent::Wheel { delta_y, .. } if *delta_y < 0.0));
            }
        }

        #[test]
        fn test_zoom_out_scrolls_down() {
            let events = Gesture::ZoomOut { notches: 1 }.plan(&MAP, GesturePlan::default());
            assert!(matches!(events[1], PointerEvent::Wheel { delta_y, .. } if delta_y > 0.0));
        }

        #[test]
        fn test_pan_is_left_drag_with_steps() {
            let plan = GesturePlan {
                divisor: 4.0,
                steps: 5,
            };
            let events = Gesture::Pan { dx: 100.0, dy: -50.0 }.plan(&MAP, plan);
            let start = Point::new(300.0, 300.0);
            assert_eq!(events.len(), 1 + 1 + 5 + 1);
            assert_eq!(
                events[1],
                PointerEvent::Down {
                    point: start,
                    button: MouseButton::Left,
                    click_count: 1
                }
            );
            assert_eq!(
                events.last().copied(),
                Some(PointerEvent::Up {
                    point: start.offset(100.0, -50.0),
                    button: MouseButton::Left,
                    click_count: 1
                })
            );
        }

        #[test]
        fn test_rotate_and_tilt_use_right_button() {
            for gesture in [Gesture::Rotate { pixels: 80.0 }, Gesture::Tilt { pixels: 40.0 }] {
                let events = gesture.plan(&MAP, GesturePlan::default());
                assert!(matches!(
                    events[1],
                    PointerEvent::Down {
                        button: MouseButton::Right,
                        ..
                    }
                ));
            }
        }
    }

    mod telemetry_tests {
        use super::*;
        use std::collections::HashMap;

        fn state(attrs: &[(&str, &str)]) -> ElementState {
            ElementState {
                attributes: attrs
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect::<HashMap<_, _>>(),
                ..ElementState::default()
            }
        }

        #[test]
        fn test_parse_all_attributes() {
            let t = MapTelemetry::from_state(&state(&[
                (ZOOM_ATTR, "15.25"),
                (ROTATION_ATTR, "-12"),
                (CAMERA_ATTR, "103.8, 1.35, 900"),
            ]))
            .unwrap();
            assert_eq!(t, telemetry(15.25, -12.0, [103.8, 1.35, 900.0]));
        }

        #[test]
        fn test_missing_attribute_is_decode_error() {
            let err = MapTelemetry::from_state(&state(&[(ZOOM_ATTR, "15")])).unwrap_err();
            assert!(matches!(err, E2eError::Decode { .. }));
        }

        #[test]
        fn test_bad_camera_arity() {
            let err = MapTelemetry::from_state(&state(&[
                (ZOOM_ATTR, "15"),
                (ROTATION_ATTR, "0"),
                (CAMERA_ATTR, "1,2"),
            ]))
            .unwrap_err();
            assert!(err.to_string().contains("expected 3 components"));
        }

        #[test]
        fn test_attribute_round_trip_is_parseable() {
            let t = telemetry(3.5, 90.0, [1.0, 2.0, 3.0]);
            let attrs: Vec<(String, String)> = t
                .to_attributes()
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect();
            let s = ElementState {
                attributes: attrs.into_iter().collect(),
                ..ElementState::default()
            };
            assert_eq!(MapTelemetry::from_state(&s).unwrap(), t);
        }

        #[test]
        fn test_rotation_delta_wraps() {
            let d = telemetry(1.0, 5.0, [0.0; 3]).delta(&telemetry(1.0, 355.0, [0.0; 3]));
            assert!((d.rotation - 10.0).abs() < 1e-9);
        }

        #[test]
        fn test_verify_directions() {
            let before = telemetry(14.0, 0.0, [0.0, 0.0, 100.0]);
            let zoomed = telemetry(15.0, 0.0, [0.0, 0.0, 80.0]);
            assert!(Gesture::ZoomIn { notches: 1 }.verify(&before, &zoomed).is_ok());
            assert!(Gesture::ZoomOut { notches: 1 }.verify(&before, &zoomed).is_err());
            assert!(Gesture::Rotate { pixels: 10.0 }.verify(&before, &zoomed).is_err());
            assert!(Gesture::Pan { dx: 1.0, dy: 0.0 }.verify(&before, &zoomed).is_ok());
            assert!(before.delta(&before).is_zero());
        }
    }
}
