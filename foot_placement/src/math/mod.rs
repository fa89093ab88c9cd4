pub mod geometry;
pub mod types;

pub use geometry::{
    clamp_lenient, clamp_to_max_size, distance_to_plane_along_direction, find_between_normals,
    find_between_vectors, point_direction_plane_intersection, range_pct, reject_axis,
    safe_normal, scale_rotation, sphere_dist_to_line, swing_twist,
};
pub use types::{Iso, Plane, Quat, Transform, Vec3};
