use axum::Json;
use serde::Serialize;

use crate::catalog::{self, Gender, Product};
use crate::utils::timing::start_request_timer;

#[derive(Debug, Serialize)]
pub struct StyleView {
    pub occasion: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Serialize)]
pub struct FitAdviceView {
    pub body_type: &'static str,
    pub advice: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ProductView {
    pub id: &'static str,
    pub name: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub gender: Gender,
    pub styles: Vec<StyleView>,
    pub body_type_advice: Vec<FitAdviceView>,
}

impl From<&'static Product> for ProductView {
    fn from(product: &'static Product) -> Self {
        ProductView {
            id: product.id,
            name: product.name,
            kind: product.kind,
            gender: product.gender,
            styles: product
                .styles
                .iter()
                .map(|&(occasion, description)| StyleView {
                    occasion,
                    description,
                })
                .collect(),
            body_type_advice: product
                .body_type_advice
                .iter()
                .map(|&(body_type, advice)| FitAdviceView { body_type, advice })
                .collect(),
        }
    }
}

pub async fn list_products() -> Json<Vec<ProductView>> {
    let _timer = start_request_timer("GET /catalog", None);
    Json(catalog::all().iter().map(ProductView::from).collect())
}
