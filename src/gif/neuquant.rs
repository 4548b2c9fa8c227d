//! NeuQuant color quantizer
//!
//! Self-organizing map over RGB space (Dekker, 1994). A network of up to 256
//! neurons starts on the gray diagonal and is pulled toward sampled pixel
//! colors. After training the neurons become the palette, sorted by green to
//! answer nearest-color queries without a full scan.
//!
//! All arithmetic is integer, so identical input and sample factor always
//! produce the identical palette and index assignment.

use crate::errors::ExportError;

pub const MAX_NET_SIZE: usize = 256;
pub const MIN_NET_SIZE: usize = 4;
pub const MAX_SAMPLE_FACTOR: u32 = 30;

/// Number of learning cycles
const NCYCLES: usize = 100;

const NET_BIAS_SHIFT: i32 = 4;
const INT_BIAS_SHIFT: i32 = 16;
const INT_BIAS: i32 = 1 << INT_BIAS_SHIFT;
const GAMMA_SHIFT: i32 = 10;
const BETA_SHIFT: i32 = 10;
const BETA: i32 = INT_BIAS >> BETA_SHIFT;
const BETA_GAMMA: i32 = INT_BIAS << (GAMMA_SHIFT - BETA_SHIFT);

const RADIUS_BIAS_SHIFT: i32 = 6;
const RADIUS_BIAS: i32 = 1 << RADIUS_BIAS_SHIFT;
const RADIUS_DEC: i32 = 30;

const ALPHA_BIAS_SHIFT: i32 = 10;
const INIT_ALPHA: i32 = 1 << ALPHA_BIAS_SHIFT;
const RAD_BIAS_SHIFT: i32 = 8;
const RAD_BIAS: i32 = 1 << RAD_BIAS_SHIFT;
const ALPHA_RAD_BIAS: i64 = 1 << (ALPHA_BIAS_SHIFT + RAD_BIAS_SHIFT);

/// Sampling strides; pixel count is checked against each so the walk covers
/// the whole image before repeating.
const PRIMES: [usize; 4] = [499, 491, 487, 503];
const MIN_PICTURE_BYTES: usize = 3 * 503;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Neuron {
    r: i32,
    g: i32,
    b: i32,
    /// Position before the green sort, i.e. the palette index
    index: usize,
}

impl Neuron {
    #[inline]
    fn distance(&self, r: i32, g: i32, b: i32) -> i32 {
        (self.r - r).abs() + (self.g - g).abs() + (self.b - b).abs()
    }
}

/// Trained (or training) quantizer network
#[derive(Debug, Clone)]
pub struct NeuQuant {
    network: [Neuron; MAX_NET_SIZE],
    /// First network position for each green value
    net_index: [usize; 256],
    bias: [i32; MAX_NET_SIZE],
    freq: [i32; MAX_NET_SIZE],
    rad_power: [i32; MAX_NET_SIZE >> 3],
    net_size: usize,
    sample_factor: u32,
}

impl NeuQuant {
    /// Create an untrained network with `net_size` neurons on the gray diagonal.
    pub fn new(net_size: usize, sample_factor: u32) -> Result<Self, ExportError> {
        if !(MIN_NET_SIZE..=MAX_NET_SIZE).contains(&net_size) {
            return Err(ExportError::InvalidArgument(format!(
                "palette size must be {}-{}, got {}",
                MIN_NET_SIZE, MAX_NET_SIZE, net_size
            )));
        }
        if sample_factor == 0 || sample_factor > MAX_SAMPLE_FACTOR {
            return Err(ExportError::InvalidArgument(format!(
                "sample factor must be 1-{}, got {}",
                MAX_SAMPLE_FACTOR, sample_factor
            )));
        }

        let mut network = [Neuron::default(); MAX_NET_SIZE];
        let mut freq = [0i32; MAX_NET_SIZE];
        for (i, neuron) in network.iter_mut().take(net_size).enumerate() {
            let v = ((i << (NET_BIAS_SHIFT + 8)) / net_size) as i32;
            *neuron = Neuron {
                r: v,
                g: v,
                b: v,
                index: i,
            };
            freq[i] = INT_BIAS / net_size as i32;
        }

        Ok(Self {
            network,
            net_index: [0; 256],
            bias: [0; MAX_NET_SIZE],
            freq,
            rad_power: [0; MAX_NET_SIZE >> 3],
            net_size,
            sample_factor,
        })
    }

    /// Train a network on packed RGB triples and build its lookup index.
    pub fn train(rgb: &[u8], net_size: usize, sample_factor: u32) -> Result<Self, ExportError> {
        let mut nq = Self::new(net_size, sample_factor)?;
        nq.learn(rgb);
        nq.unbias();
        nq.build_index();
        Ok(nq)
    }

    pub fn net_size(&self) -> usize {
        self.net_size
    }

    pub fn sample_factor(&self) -> u32 {
        self.sample_factor
    }

    /// Palette as RGB triples ordered by palette index
    pub fn palette(&self) -> Vec<u8> {
        let mut palette = vec![0u8; self.net_size * 3];
        for neuron in &self.network[..self.net_size] {
            let at = neuron.index * 3;
            palette[at] = neuron.r as u8;
            palette[at + 1] = neuron.g as u8;
            palette[at + 2] = neuron.b as u8;
        }
        palette
    }

    /// Palette index of the color closest to (r, g, b), argument order b, g, r.
    ///
    /// Walks outward from the green-sorted index in both directions and stops
    /// each direction once the green difference alone exceeds the best match.
    pub fn map(&self, b: u8, g: u8, r: u8) -> usize {
        let (r, g, b) = (r as i32, g as i32, b as i32);
        let size = self.net_size as isize;
        let mut best_d = 1000;
        let mut best = 0usize;

        let mut i = self.net_index[g as usize] as isize;
        let mut j = i - 1;

        while i < size || j >= 0 {
            if i < size {
                let p = &self.network[i as usize];
                let dist = p.g - g;
                if dist >= best_d {
                    i = size;
                } else {
                    i += 1;
                    let dist = dist.abs() + (p.b - b).abs();
                    if dist < best_d {
                        let dist = dist + (p.r - r).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = p.index;
                        }
                    }
                }
            }
            if j >= 0 {
                let p = &self.network[j as usize];
                let dist = g - p.g;
                if dist >= best_d {
                    j = -1;
                } else {
                    j -= 1;
                    let dist = dist.abs() + (p.b - b).abs();
                    if dist < best_d {
                        let dist = dist + (p.r - r).abs();
                        if dist < best_d {
                            best_d = dist;
                            best = p.index;
                        }
                    }
                }
            }
        }
        best
    }

    /// Map packed RGBA pixels to palette indices
    pub fn index_rgba(&self, rgba: &[u8]) -> Vec<u8> {
        rgba.chunks_exact(4)
            .map(|p| self.map(p[2], p[1], p[0]) as u8)
            .collect()
    }

    /// Map packed RGB pixels to palette indices
    pub fn index_rgb(&self, rgb: &[u8]) -> Vec<u8> {
        rgb.chunks_exact(3)
            .map(|p| self.map(p[2], p[1], p[0]) as u8)
            .collect()
    }

    fn learn(&mut self, rgb: &[u8]) {
        let length = rgb.len() - rgb.len() % 3;
        if length == 0 {
            return;
        }

        let (sample_factor, step) = if length < MIN_PICTURE_BYTES {
            // Too small to sample sparsely: visit every pixel
            (1, 3)
        } else {
            let prime = PRIMES
                .iter()
                .copied()
                .find(|p| length % p != 0)
                .unwrap_or(PRIMES[3]);
            (self.sample_factor as usize, 3 * prime)
        };

        let alpha_dec = 30 + ((sample_factor as i32 - 1) / 3);
        let sample_pixels = length / (3 * sample_factor);
        let delta = (sample_pixels / NCYCLES).max(1);

        let mut alpha = INIT_ALPHA;
        let mut radius = (self.net_size as i32 >> 3) * RADIUS_BIAS;
        let mut rad = radius >> RADIUS_BIAS_SHIFT;
        if rad <= 1 {
            rad = 0;
        }
        self.update_rad_power(alpha, rad);

        log::trace!(
            "NeuQuant: {} neurons, {} bytes, sampling {} pixels (step {})",
            self.net_size,
            length,
            sample_pixels,
            step
        );

        let mut pix = 0usize;
        for i in 1..=sample_pixels {
            let r = (rgb[pix] as i32) << NET_BIAS_SHIFT;
            let g = (rgb[pix + 1] as i32) << NET_BIAS_SHIFT;
            let b = (rgb[pix + 2] as i32) << NET_BIAS_SHIFT;

            let winner = self.contest(r, g, b);
            self.alter_single(alpha, winner, r, g, b);
            if rad != 0 {
                self.alter_neighbours(rad, winner, r, g, b);
            }

            pix += step;
            if pix >= length {
                pix -= length;
            }

            if i % delta == 0 {
                alpha -= alpha / alpha_dec;
                radius -= radius / RADIUS_DEC;
                rad = radius >> RADIUS_BIAS_SHIFT;
                if rad <= 1 {
                    rad = 0;
                }
                self.update_rad_power(alpha, rad);
            }
        }
    }

    fn update_rad_power(&mut self, alpha: i32, rad: i32) {
        let rad_sq = rad * rad;
        for (i, power) in self.rad_power.iter_mut().take(rad as usize).enumerate() {
            let i = i as i32;
            *power = alpha * (((rad_sq - i * i) * RAD_BIAS) / rad_sq);
        }
    }

    /// Find the winning neuron for a sample.
    ///
    /// The returned neuron minimizes distance minus its bias; neurons that
    /// rarely win accumulate bias so they are not starved out of training.
    fn contest(&mut self, r: i32, g: i32, b: i32) -> usize {
        let mut best_d = i32::MAX;
        let mut best_bias_d = i32::MAX;
        let mut best_pos = 0usize;
        let mut best_bias_pos = 0usize;

        for i in 0..self.net_size {
            let dist = self.network[i].distance(r, g, b);
            if dist < best_d {
                best_d = dist;
                best_pos = i;
            }
            let bias_dist = dist - (self.bias[i] >> (INT_BIAS_SHIFT - NET_BIAS_SHIFT));
            if bias_dist < best_bias_d {
                best_bias_d = bias_dist;
                best_bias_pos = i;
            }
            let beta_freq = self.freq[i] >> BETA_SHIFT;
            self.freq[i] -= beta_freq;
            self.bias[i] += beta_freq << GAMMA_SHIFT;
        }

        self.freq[best_pos] += BETA;
        self.bias[best_pos] -= BETA_GAMMA;
        best_bias_pos
    }

    fn alter_single(&mut self, alpha: i32, i: usize, r: i32, g: i32, b: i32) {
        let n = &mut self.network[i];
        n.r -= (alpha * (n.r - r)) / INIT_ALPHA;
        n.g -= (alpha * (n.g - g)) / INIT_ALPHA;
        n.b -= (alpha * (n.b - b)) / INIT_ALPHA;
    }

    fn alter_neighbours(&mut self, rad: i32, i: usize, r: i32, g: i32, b: i32) {
        let center = i as i32;
        let lo = (center - rad).max(-1);
        let hi = (center + rad).min(self.net_size as i32);

        let mut j = center + 1;
        let mut k = center - 1;
        let mut m = 1usize;

        while j < hi || k > lo {
            let a = self.rad_power[m] as i64;
            m += 1;
            if j < hi {
                pull(&mut self.network[j as usize], a, r, g, b);
                j += 1;
            }
            if k > lo {
                pull(&mut self.network[k as usize], a, r, g, b);
                k -= 1;
            }
        }
    }

    fn unbias(&mut self) {
        for neuron in &mut self.network[..self.net_size] {
            neuron.r = (neuron.r >> NET_BIAS_SHIFT).clamp(0, 255);
            neuron.g = (neuron.g >> NET_BIAS_SHIFT).clamp(0, 255);
            neuron.b = (neuron.b >> NET_BIAS_SHIFT).clamp(0, 255);
        }
    }

    /// Selection-sort the network by green and record where each green value starts.
    fn build_index(&mut self) {
        let size = self.net_size;
        let max_pos = size - 1;
        let mut previous = 0usize;
        let mut start = 0usize;

        for i in 0..size {
            let mut small_pos = i;
            let mut small_val = self.network[i].g;
            for j in (i + 1)..size {
                if self.network[j].g < small_val {
                    small_pos = j;
                    small_val = self.network[j].g;
                }
            }
            self.network.swap(i, small_pos);

            let small_val = small_val as usize;
            if small_val != previous {
                self.net_index[previous] = (start + i) >> 1;
                for slot in &mut self.net_index[(previous + 1)..small_val] {
                    *slot = i;
                }
                previous = small_val;
                start = i;
            }
        }

        self.net_index[previous] = (start + max_pos) >> 1;
        for slot in &mut self.net_index[(previous + 1)..] {
            *slot = max_pos;
        }
    }
}

#[inline]
fn pull(n: &mut Neuron, a: i64, r: i32, g: i32, b: i32) {
    n.r -= ((a * (n.r - r) as i64) / ALPHA_RAD_BIAS) as i32;
    n.g -= ((a * (n.g - g) as i64) / ALPHA_RAD_BIAS) as i32;
    n.b -= ((a * (n.b - b) as i64) / ALPHA_RAD_BIAS) as i32;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_rgb(width: usize, height: usize) -> Vec<u8> {
        let mut data = Vec::with_capacity(width * height * 3);
        for y in 0..height {
            for x in 0..width {
                data.push((x * 255 / width.max(1)) as u8);
                data.push((y * 255 / height.max(1)) as u8);
                data.push(((x + y) % 256) as u8);
            }
        }
        data
    }

    #[test]
    fn test_rejects_bad_parameters() {
        assert!(NeuQuant::new(2, 10).is_err());
        assert!(NeuQuant::new(512, 10).is_err());
        assert!(NeuQuant::new(256, 0).is_err());
        assert!(NeuQuant::new(256, 31).is_err());
        assert!(NeuQuant::new(64, 1).is_ok());
    }

    #[test]
    fn test_initial_network_on_gray_diagonal() {
        let nq = NeuQuant::new(64, 10).unwrap();
        for n in &nq.network[..64] {
            assert_eq!(n.r, n.g);
            assert_eq!(n.g, n.b);
        }
        assert!(nq.network[63].g > nq.network[0].g);
    }

    #[test]
    fn test_palette_size_matches_network() {
        for size in [64, 128, 256] {
            let nq = NeuQuant::train(&gradient_rgb(64, 48), size, 10).unwrap();
            assert_eq!(nq.palette().len(), size * 3);
        }
    }

    #[test]
    fn test_deterministic() {
        let pixels = gradient_rgb(80, 60);
        let a = NeuQuant::train(&pixels, 128, 10).unwrap();
        let b = NeuQuant::train(&pixels, 128, 10).unwrap();
        assert_eq!(a.palette(), b.palette());
        assert_eq!(a.index_rgb(&pixels), b.index_rgb(&pixels));
    }

    #[test]
    fn test_solid_color_maps_close() {
        let pixels: Vec<u8> = std::iter::repeat([200u8, 30, 90])
            .take(40 * 40)
            .flatten()
            .collect();
        let nq = NeuQuant::train(&pixels, 64, 1).unwrap();
        let idx = nq.map(90, 30, 200);
        let palette = nq.palette();
        let (r, g, b) = (palette[idx * 3], palette[idx * 3 + 1], palette[idx * 3 + 2]);
        let err = (r as i32 - 200).abs() + (g as i32 - 30).abs() + (b as i32 - 90).abs();
        assert!(err < 12, "nearest color ({r},{g},{b}) too far from sample");
    }

    #[test]
    fn test_map_matches_exhaustive_search() {
        let pixels = gradient_rgb(50, 50);
        let nq = NeuQuant::train(&pixels, 64, 5).unwrap();
        let palette = nq.palette();
        for p in pixels.chunks_exact(3).step_by(37) {
            let idx = nq.map(p[2], p[1], p[0]);
            let dist = |i: usize| {
                (palette[i * 3] as i32 - p[0] as i32).abs()
                    + (palette[i * 3 + 1] as i32 - p[1] as i32).abs()
                    + (palette[i * 3 + 2] as i32 - p[2] as i32).abs()
            };
            let best = (0..64).map(dist).min().unwrap();
            assert_eq!(dist(idx), best);
        }
    }

    #[test]
    fn test_tiny_and_empty_inputs() {
        let nq = NeuQuant::train(&[10, 20, 30], 64, 10).unwrap();
        assert!(nq.map(30, 20, 10) < 64);
        let empty = NeuQuant::train(&[], 64, 10).unwrap();
        assert_eq!(empty.palette().len(), 64 * 3);
    }
}
