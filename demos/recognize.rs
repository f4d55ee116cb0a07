use std::env;

use roman_ocr_rust::{Config, EncodedImage, PredictionService};

fn main() {
    let path = env::args().nth(1).expect("no image path");

    let bytes = std::fs::read(path).unwrap();
    let service = PredictionService::from_config(&Config::default());

    let result = service.predict(EncodedImage::sniff(bytes));
    println!("{result}");
}
