//! Consumes `EyeData`, smooths it through a One-Euro filter, and sends it
//! to VRChat's fixed avatar-parameter endpoint set over OSC/UDP.

use eye_config::OscConfig;
use eye_types::{EyeData, OneEuroFilter, TrackerPosition};
use rosc::{OscMessage, OscPacket, OscType};
use tokio::net::UdpSocket;

use crate::error::Result;

/// Mirrors the smoothed `(x, y)` into VRChat's coordinate convention:
/// `y` always flips, `x` flips only for the left eye (so both eyes look
/// the same direction when the subject converges).
fn map_coordinates(x: f64, y: f64, position: TrackerPosition) -> (f64, f64) {
    let mapped_y = -(2.0 * (y - 0.5));
    let mapped_x = match position {
        TrackerPosition::RightEye => 2.0 * (x - 0.5),
        _ => -(2.0 * (x - 0.5)),
    };
    (mapped_x, mapped_y)
}

pub struct Transmitter {
    socket: UdpSocket,
    filter: OneEuroFilter,
}

impl Transmitter {
    pub async fn bind(min_cutoff: f64, beta: f64) -> Result<Self> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        Ok(Self {
            socket,
            filter: OneEuroFilter::new(2, min_cutoff, beta),
        })
    }

    /// Applies a tracker's latest `min_cutoff`/`speed_coefficient` to the
    /// running filter, so an algorithm config change takes effect without
    /// restarting the transmitter.
    pub fn reconfigure(&mut self, min_cutoff: f64, beta: f64) {
        self.filter.set_params(min_cutoff, beta);
    }

    /// Smooths, maps, and sends `data` to `target` per the dispatch rules.
    /// A no-op if sending is disabled. `dt <= 0.0` bypasses smoothing.
    pub async fn send(&mut self, target: (&str, u16), config: &OscConfig, data: EyeData, dt: f64) -> Result<()> {
        if !config.enable_sending {
            return Ok(());
        }

        let smoothed = self.filter.filter(&[data.x, data.y], dt);
        let (x, y) = map_coordinates(smoothed[0], smoothed[1], data.position);

        let mut messages = vec![(config.endpoints.eyes_y.clone(), y as f32)];
        if config.mirror_eyes {
            messages.push((config.endpoints.left_eye_x.clone(), x as f32));
            messages.push((config.endpoints.right_eye_x.clone(), x as f32));
            messages.push((config.endpoints.left_eye_blink.clone(), data.blink as f32));
            messages.push((config.endpoints.right_eye_blink.clone(), data.blink as f32));
        } else {
            match data.position {
                TrackerPosition::LeftEye => {
                    messages.push((config.endpoints.left_eye_x.clone(), x as f32));
                    messages.push((config.endpoints.left_eye_blink.clone(), data.blink as f32));
                }
                TrackerPosition::RightEye => {
                    messages.push((config.endpoints.right_eye_x.clone(), x as f32));
                    messages.push((config.endpoints.right_eye_blink.clone(), data.blink as f32));
                }
                _ => return Ok(()),
            }
        }

        let addr = format!("{}:{}", target.0, target.1);
        for (path, value) in messages {
            let packet = OscPacket::Message(OscMessage {
                addr: path,
                args: vec![OscType::Float(value)],
            });
            let bytes = rosc::encoder::encode(&packet).map_err(crate::error::Error::Osc)?;
            self.socket.send_to(&bytes, &addr).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn left_eye_x_flips_right_eye_x_does_not() {
        let (lx, _) = map_coordinates(0.75, 0.5, TrackerPosition::LeftEye);
        let (rx, _) = map_coordinates(0.75, 0.5, TrackerPosition::RightEye);
        assert!((lx - (-0.5)).abs() < 1e-9);
        assert!((rx - 0.5).abs() < 1e-9);
    }

    #[test]
    fn y_always_flips_regardless_of_position() {
        let (_, ly) = map_coordinates(0.5, 0.25, TrackerPosition::LeftEye);
        let (_, ry) = map_coordinates(0.5, 0.25, TrackerPosition::RightEye);
        assert!((ly - 0.5).abs() < 1e-9);
        assert!((ry - 0.5).abs() < 1e-9);
    }
}
