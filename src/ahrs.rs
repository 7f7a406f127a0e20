use glam::{vec4, Mat3, Quat, Vec3};

const DEG_TO_RAD: f32 = 0.0174533;

// https://github.com/arduino-libraries/MadgwickAHRS
pub struct Ahrs {
    beta: f32,
    q: Quat,
    inv_sample_freq: f32,
}

impl Ahrs {
    pub fn new(freq: f32) -> Self {
        Self {
            beta: 0.1,
            q: Quat::IDENTITY,
            inv_sample_freq: freq.recip(),
        }
    }

    pub fn rotation(&self) -> Quat {
        self.q
    }

    pub fn set_rotation(&mut self, q: Quat) {
        self.q = q.normalize();
    }

    /// `gyro` in deg/s, `accel` in any unit (only its direction is used).
    pub fn update_imu(&mut self, gyro: Vec3, accel: Vec3) {
        let g = gyro * DEG_TO_RAD;
        let [q1, q2, q3, q0] = self.q.to_array();

        // Rate of change of quaternion from gyroscope
        let mut q_dot = 0.5
            * vec4(
                -q1 * g.x - q2 * g.y - q3 * g.z,
                q0 * g.x + q2 * g.z - q3 * g.y,
                q0 * g.y - q1 * g.z + q3 * g.x,
                q0 * g.z + q1 * g.y - q2 * g.x,
            );

        if accel != Vec3::ZERO {
            let a = accel.normalize();

            // Auxiliary variables to avoid repeated arithmetic
            let _2q0 = 2.0 * q0;
            let _2q1 = 2.0 * q1;
            let _2q2 = 2.0 * q2;
            let _2q3 = 2.0 * q3;
            let _4q0 = 4.0 * q0;
            let _4q1 = 4.0 * q1;
            let _4q2 = 4.0 * q2;
            let _8q1 = 8.0 * q1;
            let _8q2 = 8.0 * q2;
            let q0q0 = q0 * q0;
            let q1q1 = q1 * q1;
            let q2q2 = q2 * q2;
            let q3q3 = q3 * q3;

            // Gradient decent algorithm corrective step
            let s = vec4(
                _4q0 * q2q2 + _2q2 * a.x + _4q0 * q1q1 - _2q1 * a.y,
                _4q1 * q3q3 - _2q3 * a.x + 4.0 * q0q0 * q1 - _2q0 * a.y - _4q1
                    + _8q1 * q1q1
                    + _8q1 * q2q2
                    + _4q1 * a.z,
                4.0 * q0q0 * q2 + _2q0 * a.x + _4q2 * q3q3 - _2q3 * a.y - _4q2
                    + _8q2 * q1q1
                    + _8q2 * q2q2
                    + _4q2 * a.z,
                4.0 * q1q1 * q3 - _2q1 * a.x + 4.0 * q2q2 * q3 - _2q2 * a.y,
            );

            // zero when the estimate already matches gravity
            if s.length_squared() > 0.0 {
                q_dot -= self.beta * s.normalize();
            }
        }

        // Integrate rate of change of quaternion to yield quaternion
        let q = Quat::from_xyzw(
            q1 + q_dot.y * self.inv_sample_freq,
            q2 + q_dot.z * self.inv_sample_freq,
            q3 + q_dot.w * self.inv_sample_freq,
            q0 + q_dot.x * self.inv_sample_freq,
        );
        self.q = q.normalize();
    }
}

/// Tilt-compensated compass: body to world (x north, y west, z up) rotation from
/// gravity and the geomagnetic field. `None` when the two are (nearly) parallel.
pub fn ecompass(accel: Vec3, mag: Vec3) -> Option<Quat> {
    if accel.length_squared() == 0.0 {
        return None;
    }
    let up = accel.normalize();
    let east = mag.cross(up);
    if east.length_squared() < 1e-6 {
        return None;
    }
    let east = east.normalize();
    let north = up.cross(east);
    let west = -east;

    // rows are the world axes seen from the body
    Some(Quat::from_mat3(&Mat3::from_cols(north, west, up).transpose()).normalize())
}
