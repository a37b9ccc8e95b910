use nalgebra::Vector3;

/// Squared site distance below which the linear site potential saturates and no
/// derivative is produced.
pub const MIN_SITE_DISTANCE2: f64 = 1e-5;
/// Distance below which the harmonic site potential produces no derivative.
pub const MIN_SITE_DISTANCE: f64 = 1e-5;
/// Center distance below which whole-body potentials have no defined direction.
pub const MIN_CENTER_DISTANCE: f64 = 1e-9;

#[inline]
pub fn harmonic_site(k: f64, range: f64, distance2: f64) -> f64 {
    0.5 * k * distance2 - 0.5 * k * range * range
}

#[inline]
pub fn linear_site(k: f64, range: f64, distance: f64) -> f64 {
    -k * (range - distance)
}

/// Linear repulsion between overlapping spheres.
///
/// Returns `(score, d score / d surface_distance)`; both are zero once the spheres
/// no longer overlap.
#[inline]
pub fn linear_soft_sphere(k: f64, surface_distance: f64) -> (f64, f64) {
    if surface_distance >= 0.0 {
        return (0.0, 0.0);
    }
    (-k * surface_distance, -k)
}

/// Non-specific linear attraction between sphere surfaces.
///
/// The well is `-k * (range - s)` for `0 <= s <= range`; it is flat at `-k * range`
/// once the surfaces touch, and zero beyond `range`.
#[inline]
pub fn linear_attraction(k: f64, range: f64, surface_distance: f64) -> (f64, f64) {
    if surface_distance > range {
        (0.0, 0.0)
    } else if surface_distance < 0.0 {
        (-k * range, 0.0)
    } else {
        (-k * (range - surface_distance), k)
    }
}

/// Linear well around a rest length, `k * |d - rest_length|`.
#[inline]
pub fn linear_well(k: f64, rest_length: f64, distance: f64) -> (f64, f64) {
    let stretch = distance - rest_length;
    (k * stretch.abs(), k * stretch.signum())
}

/// Harmonic penalty on the amount `excess` by which a bound is violated.
#[inline]
pub fn harmonic_upper_bound(k: f64, excess: f64) -> (f64, f64) {
    if excess <= 0.0 {
        return (0.0, 0.0);
    }
    (0.5 * k * excess * excess, k * excess)
}

/// Signed distance from `point` to a slab of `thickness` centered on `z = 0` and pierced
/// by a cylindrical tunnel of `tunnel_radius` around the z axis, with its gradient.
///
/// The distance is negative inside the slab material, where it measures the depth to
/// the nearest face or tunnel wall. On the tunnel axis the radial part of the gradient
/// is undefined and left at zero.
pub fn slab_signed_distance(
    point: &Vector3<f64>,
    thickness: f64,
    tunnel_radius: f64,
) -> (f64, Vector3<f64>) {
    let half = 0.5 * thickness;
    let radial = point.xy().norm();
    let radial_direction = if radial < MIN_CENTER_DISTANCE {
        Vector3::zeros()
    } else {
        Vector3::new(point.x / radial, point.y / radial, 0.0)
    };
    let z_direction = Vector3::new(0.0, 0.0, point.z.signum());

    let beyond_face = (point.z.abs() - half).max(0.0);
    let inside_tunnel = (tunnel_radius - radial).max(0.0);
    if beyond_face > 0.0 || inside_tunnel > 0.0 {
        let distance = beyond_face.hypot(inside_tunnel);
        let gradient = (z_direction * beyond_face - radial_direction * inside_tunnel) / distance;
        return (distance, gradient);
    }

    let depth_below_face = half - point.z.abs();
    let depth_behind_wall = radial - tunnel_radius;
    if depth_below_face <= depth_behind_wall {
        (-depth_below_face, z_direction)
    } else {
        (-depth_behind_wall, -radial_direction)
    }
}
