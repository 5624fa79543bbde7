/// Account snapshot as reported by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub status: String,
    pub cash: f64,
    pub equity: f64,
    pub buying_power: f64,
}

impl Account {
    pub fn can_afford(&self, amount: f64) -> bool {
        self.cash >= amount
    }
}
