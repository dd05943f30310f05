use rand::Rng;

/// Source of public product identifiers.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> String;
}

/// Four digits followed by four uppercase letters, e.g. `4821KQZA`.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomIdGenerator;

impl IdGenerator for RandomIdGenerator {
    fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let mut id = String::with_capacity(8);
        for _ in 0..4 {
            id.push(char::from(b'0' + rng.gen_range(0..10u8)));
        }
        for _ in 0..4 {
            id.push(char::from(b'A' + rng.gen_range(0..26u8)));
        }
        id
    }
}
