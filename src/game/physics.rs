//! Physics Collaborator
//!
//! The simulation never resolves contacts itself. It talks to a rigid-body
//! solver through [`PhysicsWorld`] and only reads/writes body handles.
//!
//! [`ArenaPhysics`] backs the seam with rapier2d: ball colliders for pieces,
//! fixed cuboids for the walls and floor, and rapier's island sleeping for
//! the settled flag.

use std::collections::HashMap;
use std::fmt;

use rapier2d::prelude::*;

use crate::core::vec2::Vec2;
use crate::game::rank::Material;

/// Opaque handle to a body owned by the physics world.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BodyHandle(pub u32);

impl fmt::Display for BodyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "body#{}", self.0)
    }
}

/// Static boundary shapes.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum BoundaryShape {
    /// Axis-aligned rectangle.
    Rect {
        /// Center point.
        center: Vec2,
        /// Half width / half height.
        half_extents: Vec2,
    },
}

/// Latest integrated state of a body.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BodyState {
    /// Center position.
    pub position: Vec2,
    /// Linear velocity (px/s).
    pub velocity: Vec2,
    /// Rotation (radians).
    pub angle: f32,
    /// Angular velocity (rad/s).
    pub angular_velocity: f32,
    /// Solver reports the body asleep.
    pub is_settled: bool,
}

/// Rigid-body solver seam.
pub trait PhysicsWorld {
    /// Create a static boundary body.
    fn create_boundary(&mut self, shape: BoundaryShape, material: Material) -> BodyHandle;

    /// Create a dynamic circle at rest.
    fn create_circular_body(&mut self, position: Vec2, radius: f32, material: Material) -> BodyHandle;

    /// Destroy a body. Returns false if the handle was unknown.
    fn destroy_body(&mut self, handle: BodyHandle) -> bool;

    /// Overwrite a body's linear velocity. Returns false if the handle was unknown.
    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> bool;

    /// Advance the world by `dt` seconds.
    fn step(&mut self, dt: f32);

    /// Read-only state of a dynamic body.
    fn body_state(&self, handle: BodyHandle) -> Option<BodyState>;

    /// Number of dynamic bodies.
    fn body_count(&self) -> usize;
}

// =============================================================================
// RAPIER BACKEND
// =============================================================================

/// Pixels per solver length unit. Sleep and contact tolerances scale with it.
const PIXELS_PER_METER: Real = 100.0;

#[derive(Debug, Clone, Copy)]
struct CircleBody {
    body: RigidBodyHandle,
    radius: f32,
}

/// rapier2d world holding the arena bounds and every piece body.
///
/// Bodies are addressed by [`BodyHandle`], mapped to rapier handles here so
/// nothing above this module sees rapier types.
pub struct ArenaPhysics {
    pipeline: PhysicsPipeline,
    gravity: Vector<Real>,
    integration_params: IntegrationParameters,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    circles: HashMap<BodyHandle, CircleBody>,
    next_handle: u32,
}

impl ArenaPhysics {
    /// Create an empty world with downward gravity (px/s²).
    pub fn new(gravity: f32) -> Self {
        let integration_params = IntegrationParameters {
            length_unit: PIXELS_PER_METER,
            ..IntegrationParameters::default()
        };

        Self {
            pipeline: PhysicsPipeline::new(),
            gravity: vector![0.0, gravity as Real],
            integration_params,
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            circles: HashMap::new(),
            next_handle: 1,
        }
    }

    fn allocate_handle(&mut self) -> BodyHandle {
        let handle = BodyHandle(self.next_handle);
        self.next_handle = self.next_handle.wrapping_add(1);
        handle
    }

    /// Wake every body within touching distance of `position`.
    fn wake_neighbours(&mut self, position: Vec2, radius: f32) {
        for circle in self.circles.values() {
            let Some(rb) = self.rigid_body_set.get_mut(circle.body) else {
                continue;
            };
            let t = rb.translation();
            let reach = radius + circle.radius + 2.0;
            if Vec2::new(t.x, t.y).distance_squared(position) <= reach * reach {
                rb.wake_up(true);
            }
        }
    }
}

impl PhysicsWorld for ArenaPhysics {
    fn create_boundary(&mut self, shape: BoundaryShape, material: Material) -> BodyHandle {
        let handle = self.allocate_handle();
        let BoundaryShape::Rect { center, half_extents } = shape;

        let body = self.rigid_body_set.insert(
            RigidBodyBuilder::fixed()
                .translation(vector![center.x as Real, center.y as Real])
                .build(),
        );
        let collider = ColliderBuilder::cuboid(half_extents.x as Real, half_extents.y as Real)
            .friction(material.friction as Real)
            .restitution(material.restitution as Real)
            .build();
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);

        handle
    }

    fn create_circular_body(&mut self, position: Vec2, radius: f32, material: Material) -> BodyHandle {
        let handle = self.allocate_handle();

        let body = self.rigid_body_set.insert(
            RigidBodyBuilder::dynamic()
                .translation(vector![position.x as Real, position.y as Real])
                .build(),
        );
        let collider = ColliderBuilder::ball(radius as Real)
            .friction(material.friction as Real)
            .restitution(material.restitution as Real)
            .density(material.density as Real)
            .build();
        self.collider_set
            .insert_with_parent(collider, body, &mut self.rigid_body_set);
        self.circles.insert(handle, CircleBody { body, radius });

        handle
    }

    fn destroy_body(&mut self, handle: BodyHandle) -> bool {
        let Some(circle) = self.circles.remove(&handle) else {
            return false;
        };
        let position = self
            .rigid_body_set
            .get(circle.body)
            .map(|rb| Vec2::new(rb.translation().x, rb.translation().y));

        self.rigid_body_set.remove(
            circle.body,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );

        // Pieces resting on the removed one lose their support
        if let Some(position) = position {
            self.wake_neighbours(position, circle.radius);
        }
        true
    }

    fn set_velocity(&mut self, handle: BodyHandle, velocity: Vec2) -> bool {
        let Some(circle) = self.circles.get(&handle) else {
            return false;
        };
        match self.rigid_body_set.get_mut(circle.body) {
            Some(rb) => {
                rb.set_linvel(vector![velocity.x as Real, velocity.y as Real], true);
                true
            }
            None => false,
        }
    }

    fn step(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.integration_params.dt = dt as Real;

        self.pipeline.step(
            &self.gravity,
            &self.integration_params,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &(),
        );
    }

    fn body_state(&self, handle: BodyHandle) -> Option<BodyState> {
        let circle = self.circles.get(&handle)?;
        let rb = self.rigid_body_set.get(circle.body)?;
        let translation = rb.translation();
        let sleeping = rb.is_sleeping();

        // Asleep bodies are at rest whatever velocity rapier last recorded
        let (velocity, angular_velocity) = if sleeping {
            (Vec2::ZERO, 0.0)
        } else {
            (Vec2::new(rb.linvel().x, rb.linvel().y), rb.angvel())
        };

        Some(BodyState {
            position: Vec2::new(translation.x, translation.y),
            velocity,
            angle: rb.rotation().angle(),
            angular_velocity,
            is_settled: sleeping,
        })
    }

    fn body_count(&self) -> usize {
        self.circles.len()
    }
}

// =============================================================================
// TEST DOUBLE
// =============================================================================


#[cfg(test)]
mod tests {
    use super::*;

    const PIECE: Material = Material {
        friction: 0.2,
        restitution: 0.2,
        density: 0.001,
    };

    const DT: f32 = 1.0 / 60.0;

    fn boxed_world() -> ArenaPhysics {
        let mut world = ArenaPhysics::new(980.0);
        // Floor with its top face at y = 590
        world.create_boundary(
            BoundaryShape::Rect {
                center: Vec2::new(200.0, 595.0),
                half_extents: Vec2::new(200.0, 5.0),
            },
            Material::BOUNDARY,
        );
        world
    }

    #[test]
    fn test_body_falls_under_gravity() {
        let mut world = ArenaPhysics::new(980.0);
        let handle = world.create_circular_body(Vec2::new(100.0, 100.0), 10.0, PIECE);

        world.step(DT);

        let state = world.body_state(handle).unwrap();
        assert!(state.position.y > 100.0);
        assert!(state.velocity.y > 0.0);
        assert!(!state.is_settled);
    }

    #[test]
    fn test_body_rests_on_floor_and_sleeps() {
        let mut world = boxed_world();
        let handle = world.create_circular_body(Vec2::new(200.0, 500.0), 20.0, PIECE);

        for _ in 0..600 {
            world.step(DT);
        }

        let state = world.body_state(handle).unwrap();
        assert!((state.position.y - 570.0).abs() < 1.0, "y = {}", state.position.y);
        assert!(state.is_settled);
        assert_eq!(state.velocity, Vec2::ZERO);
    }

    #[test]
    fn test_overlapping_circles_separate() {
        let mut world = ArenaPhysics::new(0.0);
        let a = world.create_circular_body(Vec2::new(100.0, 100.0), 10.0, PIECE);
        let b = world.create_circular_body(Vec2::new(105.0, 100.0), 10.0, PIECE);

        for _ in 0..30 {
            world.step(DT);
        }

        let pa = world.body_state(a).unwrap().position;
        let pb = world.body_state(b).unwrap().position;
        assert!(pa.distance(pb) >= 19.0, "distance = {}", pa.distance(pb));
    }

    #[test]
    fn test_removing_support_wakes_the_stack() {
        let mut world = boxed_world();
        let bottom = world.create_circular_body(Vec2::new(200.0, 570.0), 20.0, PIECE);
        let top = world.create_circular_body(Vec2::new(200.0, 530.0), 20.0, PIECE);
        for _ in 0..600 {
            world.step(DT);
        }
        assert!(world.body_state(top).unwrap().is_settled);

        assert!(world.destroy_body(bottom));
        world.step(DT);

        let state = world.body_state(top).unwrap();
        assert!(!state.is_settled);
        assert!(state.velocity.y > 0.0);
    }

    #[test]
    fn test_destroy_and_velocity() {
        let mut world = ArenaPhysics::new(0.0);
        let handle = world.create_circular_body(Vec2::new(50.0, 50.0), 10.0, PIECE);

        assert!(world.set_velocity(handle, Vec2::new(0.0, -120.0)));
        assert_eq!(world.body_state(handle).unwrap().velocity, Vec2::new(0.0, -120.0));

        assert!(world.destroy_body(handle));
        assert!(!world.destroy_body(handle));
        assert!(world.body_state(handle).is_none());
        assert!(!world.set_velocity(handle, Vec2::ZERO));
        assert_eq!(world.body_count(), 0);
    }
}
