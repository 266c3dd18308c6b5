//! Port to a 2D rigid-body backend plus a small built-in axis-aligned world.
//!
//! Coordinates follow the container: origin at the top-left corner, `x` to the
//! right and `y` pointing down, so gravity is usually `(0, +g)`.
//!
//! `AabbWorld` is not a general rigid-body engine: boxes collide by their
//! axis-aligned bounding boxes (derived from their current angle) and static
//! segments must be axis-aligned. That is enough to drop, stack and shake boxes
//! inside a rectangular container.

use crate::error::{PackingError, Result};
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, TAU};
use std::ops::{Add, AddAssign, Mul, Sub};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Vec2 {
    pub x: f64,
    pub y: f64,
}

impl Vec2 {
    pub const ZERO: Vec2 = Vec2 { x: 0.0, y: 0.0 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
    pub fn length(&self) -> f64 {
        self.x.hypot(self.y)
    }
    pub fn distance(&self, other: Vec2) -> f64 {
        (*self - other).length()
    }
    /// Unit vector at `angle` radians.
    pub fn from_angle(angle: f64) -> Self {
        Self::new(angle.cos(), angle.sin())
    }
}

impl Add for Vec2 {
    type Output = Vec2;
    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Vec2) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Vec2;
    fn sub(self, rhs: Vec2) -> Vec2 {
        Vec2::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f64> for Vec2 {
    type Output = Vec2;
    fn mul(self, rhs: f64) -> Vec2 {
        Vec2::new(self.x * rhs, self.y * rhs)
    }
}

impl From<(f64, f64)> for Vec2 {
    fn from((x, y): (f64, f64)) -> Self {
        Vec2::new(x, y)
    }
}

/// Position of a body's center and its rotation in radians.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Pose {
    pub position: Vec2,
    pub angle: f64,
}

impl Pose {
    pub fn new(position: Vec2, angle: f64) -> Self {
        Self { position, angle }
    }
}

/// Opaque handle returned by a backend for each dynamic body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BodyHandle(pub usize);

/// Description of a dynamic box body. `width`/`height` are unrotated sizes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxBodyDesc {
    pub width: f64,
    pub height: f64,
    pub mass: f64,
    pub friction: f64,
    pub elasticity: f64,
    pub pose: Pose,
}

/// Minimal surface a physics backend must offer to the packing orchestrator.
///
/// Every call returns a `Result` so backend failures surface as
/// `PackingError::Backend` instead of panics.
pub trait PhysicsWorld: Send {
    fn add_dynamic_box(&mut self, desc: &BoxBodyDesc) -> Result<BodyHandle>;
    /// Adds an immovable line segment from `a` to `b`.
    fn add_static_segment(&mut self, a: Vec2, b: Vec2) -> Result<()>;
    /// Advances the simulation by `dt` seconds.
    fn step(&mut self, dt: f64) -> Result<()>;
    fn pose(&self, body: BodyHandle) -> Result<Pose>;
    fn set_pose(&mut self, body: BodyHandle, pose: Pose) -> Result<()>;
    fn set_velocity(&mut self, body: BodyHandle, linear: Vec2, angular: f64) -> Result<()>;
    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec2) -> Result<()>;
    fn set_rotation_locked(&mut self, body: BodyHandle, locked: bool) -> Result<()>;
    fn remove_body(&mut self, body: BodyHandle) -> Result<()>;
}

/// Normalizes an angle to `[0, 2π)`.
pub fn normalize_angle(angle: f64) -> f64 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Width/height of the axis-aligned bounding box of a `w`x`h` box rotated by `angle`.
///
/// Angles within `1e-9` of a multiple of 90° yield the exact (possibly swapped) sizes.
pub fn orientation_extent(w: f64, h: f64, angle: f64) -> (f64, f64) {
    let a = normalize_angle(angle);
    let quarter = (a / FRAC_PI_2).round();
    if (a - quarter * FRAC_PI_2).abs() < 1e-9 {
        return if (quarter as i64) % 2 == 1 { (h, w) } else { (w, h) };
    }
    let (c, s) = (a.cos().abs(), a.sin().abs());
    (w * c + h * s, w * s + h * c)
}

#[derive(Debug, Clone)]
struct AabbBody {
    width: f64,
    height: f64,
    inv_mass: f64,
    friction: f64,
    elasticity: f64,
    position: Vec2,
    prev_position: Vec2,
    angle: f64,
    velocity: Vec2,
    angular_velocity: f64,
    rotation_locked: bool,
}

impl AabbBody {
    fn extent(&self) -> (f64, f64) {
        orientation_extent(self.width, self.height, self.angle)
    }
}

#[derive(Debug, Clone, Copy)]
enum Segment {
    /// Line `y = at` spanning `from..to` along x.
    Horizontal { at: f64, from: f64, to: f64 },
    /// Line `x = at` spanning `from..to` along y.
    Vertical { at: f64, from: f64, to: f64 },
}

/// Built-in axis-aligned box world.
#[derive(Debug, Clone)]
pub struct AabbWorld {
    gravity: Vec2,
    damping: f64,
    iterations: usize,
    bodies: Vec<Option<AabbBody>>,
    segments: Vec<Segment>,
}

impl AabbWorld {
    /// `damping` is the fraction of velocity kept per simulated second.
    pub fn new(gravity: Vec2, damping: f64, iterations: usize) -> Self {
        Self {
            gravity,
            damping,
            iterations: iterations.max(1),
            bodies: Vec::new(),
            segments: Vec::new(),
        }
    }

    pub fn body_count(&self) -> usize {
        self.bodies.iter().filter(|b| b.is_some()).count()
    }

    fn body(&self, h: BodyHandle) -> Result<&AabbBody> {
        self.bodies
            .get(h.0)
            .and_then(|b| b.as_ref())
            .ok_or_else(|| PackingError::Backend(format!("unknown body handle {}", h.0)))
    }

    fn body_mut(&mut self, h: BodyHandle) -> Result<&mut AabbBody> {
        self.bodies
            .get_mut(h.0)
            .and_then(|b| b.as_mut())
            .ok_or_else(|| PackingError::Backend(format!("unknown body handle {}", h.0)))
    }

    fn resolve_segments(&mut self) -> bool {
        let mut touched = false;
        for seg in &self.segments {
            for body in self.bodies.iter_mut().flatten() {
                let (ew, eh) = body.extent();
                let (hw, hh) = (ew / 2.0, eh / 2.0);
                let p = body.position;
                match *seg {
                    Segment::Horizontal { at, from, to } => {
                        if p.x + hw <= from || p.x - hw >= to {
                            continue;
                        }
                        // side is taken from the pre-step center so fast bodies cannot tunnel
                        if body.prev_position.y <= at {
                            if p.y + hh > at {
                                body.position.y = at - hh;
                                if body.velocity.y > 0.0 {
                                    body.velocity.y = -body.velocity.y * body.elasticity;
                                }
                                body.velocity.x *= 1.0 - body.friction;
                                touched = true;
                            }
                        } else if p.y - hh < at {
                            body.position.y = at + hh;
                            if body.velocity.y < 0.0 {
                                body.velocity.y = -body.velocity.y * body.elasticity;
                            }
                            body.velocity.x *= 1.0 - body.friction;
                            touched = true;
                        }
                    }
                    Segment::Vertical { at, from, to } => {
                        if p.y + hh <= from || p.y - hh >= to {
                            continue;
                        }
                        if body.prev_position.x <= at {
                            if p.x + hw > at {
                                body.position.x = at - hw;
                                if body.velocity.x > 0.0 {
                                    body.velocity.x = -body.velocity.x * body.elasticity;
                                }
                                body.velocity.y *= 1.0 - body.friction;
                                touched = true;
                            }
                        } else if p.x - hw < at {
                            body.position.x = at + hw;
                            if body.velocity.x < 0.0 {
                                body.velocity.x = -body.velocity.x * body.elasticity;
                            }
                            body.velocity.y *= 1.0 - body.friction;
                            touched = true;
                        }
                    }
                }
            }
        }
        touched
    }

    fn resolve_pairs(&mut self) -> bool {
        let mut touched = false;
        let n = self.bodies.len();
        for i in 0..n {
            for j in (i + 1)..n {
                let (Some(a), Some(b)) = (&self.bodies[i], &self.bodies[j]) else {
                    continue;
                };
                let (aw, ah) = a.extent();
                let (bw, bh) = b.extent();
                let dx = b.position.x - a.position.x;
                let dy = b.position.y - a.position.y;
                let ox = (aw + bw) / 2.0 - dx.abs();
                let oy = (ah + bh) / 2.0 - dy.abs();
                if ox <= 0.0 || oy <= 0.0 {
                    continue;
                }
                let total = a.inv_mass + b.inv_mass;
                if total <= 0.0 {
                    continue;
                }
                let (share_a, share_b) = (a.inv_mass / total, b.inv_mass / total);
                let normal = if ox < oy {
                    Vec2::new(if dx >= 0.0 { 1.0 } else { -1.0 }, 0.0)
                } else {
                    Vec2::new(0.0, if dy >= 0.0 { 1.0 } else { -1.0 })
                };
                let depth = ox.min(oy);
                let (va, vb) = (a.velocity, b.velocity);
                let mass_a = if a.inv_mass > 0.0 { 1.0 / a.inv_mass } else { 0.0 };
                let mass_b = if b.inv_mass > 0.0 { 1.0 / b.inv_mass } else { 0.0 };
                let van = va.x * normal.x + va.y * normal.y;
                let vbn = vb.x * normal.x + vb.y * normal.y;
                let approaching = van - vbn > 0.0;
                let shared = (van * mass_a + vbn * mass_b) / (mass_a + mass_b);

                if let Some(a) = self.bodies[i].as_mut() {
                    a.position = a.position - normal * (depth * share_a);
                    if approaching {
                        a.velocity = a.velocity + normal * (shared - van);
                    }
                }
                if let Some(b) = self.bodies[j].as_mut() {
                    b.position = b.position + normal * (depth * share_b);
                    if approaching {
                        b.velocity = b.velocity + normal * (shared - vbn);
                    }
                }
                touched = true;
            }
        }
        touched
    }
}

impl PhysicsWorld for AabbWorld {
    fn add_dynamic_box(&mut self, desc: &BoxBodyDesc) -> Result<BodyHandle> {
        if !(desc.width > 0.0 && desc.height > 0.0 && desc.mass > 0.0) {
            return Err(PackingError::Backend(format!(
                "invalid box body {}x{} with mass {}",
                desc.width, desc.height, desc.mass
            )));
        }
        let body = AabbBody {
            width: desc.width,
            height: desc.height,
            inv_mass: 1.0 / desc.mass,
            friction: desc.friction.clamp(0.0, 1.0),
            elasticity: desc.elasticity.clamp(0.0, 1.0),
            position: desc.pose.position,
            prev_position: desc.pose.position,
            angle: desc.pose.angle,
            velocity: Vec2::ZERO,
            angular_velocity: 0.0,
            rotation_locked: false,
        };
        self.bodies.push(Some(body));
        Ok(BodyHandle(self.bodies.len() - 1))
    }

    fn add_static_segment(&mut self, a: Vec2, b: Vec2) -> Result<()> {
        let seg = if a.y == b.y {
            Segment::Horizontal {
                at: a.y,
                from: a.x.min(b.x),
                to: a.x.max(b.x),
            }
        } else if a.x == b.x {
            Segment::Vertical {
                at: a.x,
                from: a.y.min(b.y),
                to: a.y.max(b.y),
            }
        } else {
            return Err(PackingError::Backend(format!(
                "AabbWorld only supports axis-aligned segments, got ({}, {})-({}, {})",
                a.x, a.y, b.x, b.y
            )));
        };
        self.segments.push(seg);
        Ok(())
    }

    fn step(&mut self, dt: f64) -> Result<()> {
        if !(dt > 0.0 && dt.is_finite()) {
            return Err(PackingError::Backend(format!("invalid timestep {dt}")));
        }
        let keep = self.damping.powf(dt);
        for body in self.bodies.iter_mut().flatten() {
            body.velocity += self.gravity * dt;
            body.velocity = body.velocity * keep;
            body.prev_position = body.position;
            body.position += body.velocity * dt;
            if !body.rotation_locked {
                body.angular_velocity *= keep;
                body.angle += body.angular_velocity * dt;
            }
        }
        for _ in 0..self.iterations {
            let walls = self.resolve_segments();
            let pairs = self.resolve_pairs();
            if !walls && !pairs {
                break;
            }
        }
        // contact pushes may leave a body past a segment; one last wall pass wins
        self.resolve_segments();
        Ok(())
    }

    fn pose(&self, body: BodyHandle) -> Result<Pose> {
        let b = self.body(body)?;
        Ok(Pose::new(b.position, b.angle))
    }

    fn set_pose(&mut self, body: BodyHandle, pose: Pose) -> Result<()> {
        let b = self.body_mut(body)?;
        b.position = pose.position;
        b.prev_position = pose.position;
        b.angle = pose.angle;
        Ok(())
    }

    fn set_velocity(&mut self, body: BodyHandle, linear: Vec2, angular: f64) -> Result<()> {
        let b = self.body_mut(body)?;
        b.velocity = linear;
        b.angular_velocity = angular;
        Ok(())
    }

    fn apply_impulse(&mut self, body: BodyHandle, impulse: Vec2) -> Result<()> {
        let b = self.body_mut(body)?;
        b.velocity += impulse * b.inv_mass;
        Ok(())
    }

    fn set_rotation_locked(&mut self, body: BodyHandle, locked: bool) -> Result<()> {
        let b = self.body_mut(body)?;
        b.rotation_locked = locked;
        if locked {
            b.angular_velocity = 0.0;
        }
        Ok(())
    }

    fn remove_body(&mut self, body: BodyHandle) -> Result<()> {
        match self.bodies.get_mut(body.0) {
            Some(slot @ Some(_)) => {
                *slot = None;
                Ok(())
            }
            _ => Err(PackingError::Backend(format!(
                "unknown body handle {}",
                body.0
            ))),
        }
    }
}
