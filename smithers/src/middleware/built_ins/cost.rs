//! Cost-tracking middleware (spec §4.4): multiplies `tokensUsed` by a
//! model-keyed price table and reports the total through a callback.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::adapter::{AdapterOptions, AdapterResult};
use crate::middleware::{DoExecute, Middleware};

#[derive(Clone, Copy, Debug, Default)]
pub struct Price {
    pub input_per_1k: f64,
    pub output_per_1k: f64,
}

pub type CostCallback = Box<dyn Fn(&str, f64) + Send + Sync>;

pub struct CostTrackingMiddleware {
    prices: HashMap<String, Price>,
    default_price: Price,
    on_cost: CostCallback,
}

impl CostTrackingMiddleware {
    pub fn new(prices: HashMap<String, Price>, on_cost: CostCallback) -> Self {
        Self {
            prices,
            default_price: Price::default(),
            on_cost,
        }
    }

    fn price_for(&self, model: Option<&str>) -> Price {
        model
            .and_then(|m| self.prices.get(m))
            .copied()
            .unwrap_or(self.default_price)
    }
}

#[async_trait]
impl Middleware for CostTrackingMiddleware {
    fn name(&self) -> Option<&str> {
        Some("cost-tracking")
    }

    async fn wrap_execute(&self, options: AdapterOptions, do_execute: DoExecute) -> AdapterResult {
        let result = do_execute(options.clone()).await;
        let price = self.price_for(options.model.as_deref());
        let cost = (result.tokens_used.input as f64 / 1000.0) * price.input_per_1k
            + (result.tokens_used.output as f64 / 1000.0) * price.output_per_1k;
        (self.on_cost)(options.model.as_deref().unwrap_or("unknown"), cost);
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{StopReason, TokensUsed};
    use crate::middleware::Pipeline;
    use std::sync::{Arc, Mutex};

    fn result_with_tokens(input: u32, output: u32) -> AdapterResult {
        AdapterResult {
            output: "ok".into(),
            structured: None,
            tokens_used: TokensUsed { input, output },
            turns_used: 1,
            duration_ms: 0,
            stop_reason: StopReason::Completed,
        }
    }

    #[tokio::test]
    async fn computes_cost_from_model_keyed_price() {
        let mut prices = HashMap::new();
        prices.insert(
            "opus".to_string(),
            Price {
                input_per_1k: 15.0,
                output_per_1k: 75.0,
            },
        );
        let reported = Arc::new(Mutex::new(Vec::new()));
        let r2 = reported.clone();
        let mw = CostTrackingMiddleware::new(
            prices,
            Box::new(move |model, cost| r2.lock().unwrap().push((model.to_string(), cost))),
        );
        let pipeline = Pipeline::new(vec![Arc::new(mw)]);
        let mut options = AdapterOptions::new("hi");
        options.model = Some("opus".into());
        pipeline
            .run(options, |_| Box::pin(async { result_with_tokens(2000, 1000) }))
            .await;
        let entries = reported.lock().unwrap().clone();
        assert_eq!(entries, vec![("opus".to_string(), 30.0 + 75.0)]);
    }

    #[tokio::test]
    async fn unknown_model_falls_back_to_zero_price() {
        let reported = Arc::new(Mutex::new(Vec::new()));
        let r2 = reported.clone();
        let mw = CostTrackingMiddleware::new(
            HashMap::new(),
            Box::new(move |model, cost| r2.lock().unwrap().push((model.to_string(), cost))),
        );
        let pipeline = Pipeline::new(vec![Arc::new(mw)]);
        pipeline
            .run(AdapterOptions::new("hi"), |_| {
                Box::pin(async { result_with_tokens(500, 500) })
            })
            .await;
        assert_eq!(reported.lock().unwrap()[0], ("unknown".to_string(), 0.0));
    }
}
