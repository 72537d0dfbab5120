use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use rust_decimal::Decimal;

use super::{
    Checkout, GatewayError, InitializeRequest, PayerInfo, PaymentGateway, Verification,
    VerifyOutcome,
};

/// Scripted in-process gateway that counts calls
pub struct FakeGateway {
    initialize_result: Mutex<Result<(), GatewayError>>,
    verify_script: Mutex<VecDeque<Result<VerifyOutcome, GatewayError>>>,
    verify_default: Mutex<Result<VerifyOutcome, GatewayError>>,
    initialize_delay: Mutex<Duration>,
    pub initialize_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
    pub last_request: Mutex<Option<InitializeRequest>>,
}

impl Default for FakeGateway {
    fn default() -> Self {
        Self {
            initialize_result: Mutex::new(Ok(())),
            verify_script: Mutex::new(VecDeque::new()),
            verify_default: Mutex::new(Ok(VerifyOutcome::NotFound)),
            initialize_delay: Mutex::new(Duration::ZERO),
            initialize_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
        }
    }
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout_url_for(tx_ref: &str) -> String {
        format!("https://checkout.test/{tx_ref}")
    }

    pub fn success(provider_txn_id: &str) -> VerifyOutcome {
        VerifyOutcome::Found(Verification {
            verified: true,
            provider_status: "success".into(),
            provider_transaction_id: Some(provider_txn_id.into()),
            amount: Some(Decimal::new(2550, 2)),
            currency: Some("ETB".into()),
            payer: PayerInfo::default(),
            created_at: None,
        })
    }

    pub fn failed() -> VerifyOutcome {
        VerifyOutcome::Found(Verification {
            verified: false,
            provider_status: "failed".into(),
            ..Verification::pending()
        })
    }

    pub fn fail_initialize(&self, error: GatewayError) {
        *self.initialize_result.lock().unwrap() = Err(error);
    }

    pub fn delay_initialize(&self, delay: Duration) {
        *self.initialize_delay.lock().unwrap() = delay;
    }

    /// Answer every verify call with `outcome` once the script is exhausted
    pub fn verify_returns(&self, outcome: Result<VerifyOutcome, GatewayError>) {
        *self.verify_default.lock().unwrap() = outcome;
    }

    /// Queue a one-shot verify answer, consumed in order
    pub fn push_verify(&self, outcome: Result<VerifyOutcome, GatewayError>) {
        self.verify_script.lock().unwrap().push_back(outcome);
    }

    pub fn initialize_count(&self) -> usize {
        self.initialize_calls.load(Ordering::SeqCst)
    }

    pub fn verify_count(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, request: &InitializeRequest) -> Result<Checkout, GatewayError> {
        request.validate()?;
        self.initialize_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = Some(request.clone());

        let delay = *self.initialize_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let result = self.initialize_result.lock().unwrap().clone();
        result.map(|_| Checkout { checkout_url: Self::checkout_url_for(&request.tx_ref) })
    }

    async fn verify(&self, _tx_ref: &str) -> Result<VerifyOutcome, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(next) = self.verify_script.lock().unwrap().pop_front() {
            return next;
        }
        self.verify_default.lock().unwrap().clone()
    }
}
