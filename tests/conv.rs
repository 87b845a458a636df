use mnistmodel::layers::{Conv2d, Layer, MaxPool2d};
use mnistmodel::math::Matrix;
use mnistmodel::Error;

#[test]
fn conv_accepts_matching_input() {
    let conv = Conv2d::new(1, 28, 28, 10, 5, 1);
    assert_eq!(conv.output_dim(784).unwrap(), 10 * 28 * 28);
    let y = conv.forward(&Matrix::zeros(2, 784));
    assert_eq!((y.rows, y.cols), (2, 7840));
}

#[test]
fn conv_errors_on_channel_mismatch() {
    let conv = Conv2d::new(3, 4, 4, 2, 3, 1);
    assert!(matches!(
        conv.output_dim(16),
        Err(Error::Shape { expected: 48, actual: 16, .. })
    ));
}

#[test]
fn same_padding_keeps_size_for_even_kernel() {
    let conv = Conv2d::new(2, 14, 14, 4, 4, 1);
    assert_eq!(conv.out_hw(), (14, 14));
    let pool = MaxPool2d::new(4, 14, 14, 2, 2);
    assert_eq!(pool.out_hw(), (7, 7));
    assert_eq!(pool.output_dim(4 * 14 * 14).unwrap(), 4 * 7 * 7);
}

#[test]
fn identity_kernel_copies_input() {
    let mut conv = Conv2d::new(1, 2, 2, 1, 1, 1);
    conv.w.value.data = vec![1.0];
    let x = Matrix::from_vec(1, 4, vec![1.0, 2.0, 3.0, 4.0]);
    assert_eq!(conv.forward(&x).data, x.data);
}

#[test]
fn max_pool_routes_gradient_to_max() {
    let mut pool = MaxPool2d::new(1, 2, 2, 2, 2);
    let x = Matrix::from_vec(1, 4, vec![1.0, 5.0, 3.0, 2.0]);
    let y = pool.forward_train(&x);
    assert_eq!(y.data, vec![5.0]);
    let g = pool.backward(&Matrix::from_vec(1, 1, vec![1.0]));
    assert_eq!(g.data, vec![0.0, 1.0, 0.0, 0.0]);
}
