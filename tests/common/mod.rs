use mnistmodel::data::{ImageSet, MnistData, IMAGE_SIZE};
use mnistmodel::math::Matrix;

/// Digits that are trivially separable: class `c` lights up its own band of
/// pixels, plus a little deterministic background.
pub fn synthetic_set(n: usize, offset: usize) -> ImageSet {
    let band = IMAGE_SIZE / 10;
    let mut data = vec![0.0f32; n * IMAGE_SIZE];
    let mut labels = Vec::with_capacity(n);
    for i in 0..n {
        let class = (i + offset) % 10;
        labels.push(class as u8);
        let row = &mut data[i * IMAGE_SIZE..(i + 1) * IMAGE_SIZE];
        for (j, px) in row.iter_mut().enumerate() {
            *px = ((i * 31 + j * 7) % 13) as f32 / 130.0;
        }
        for px in &mut row[class * band..(class + 1) * band] {
            *px = 1.0;
        }
    }
    ImageSet::new(Matrix::from_vec(n, IMAGE_SIZE, data), labels).expect("valid synthetic set")
}

pub fn synthetic_mnist() -> MnistData {
    MnistData::new(synthetic_set(200, 0), synthetic_set(20, 3), synthetic_set(50, 7))
}
