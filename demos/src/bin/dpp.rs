//! Dining Philosophers Problem on Linux (POSIX)
//!
//! Five philosophers sit at a round table with five forks between them. Each
//! philosopher alternates between thinking and eating. To eat, a philosopher
//! needs both adjacent forks.
//!
//! This implementation uses:
//! - One active object per philosopher, each on its own thread
//! - A Table active object that owns the forks
//! - Time events for thinking and eating periods
//! - Publish-subscribe for `EAT` grants and `DONE` notices
//!
//! Pass a meal count to stop after that many meals, otherwise press Ctrl-C.

use std::env;
use std::process::ExitCode;

use qp_posix::{ClockTick, PosixError, PosixKernel};
use qp_qf::{
    ActiveContext, Evt, QHsm, QSignal, QStateMachine, QStateReturn, QTimeEvt, QfConfig, QF,
};

/// Number of philosophers
const N_PHILO: u8 = 5;

/// Published: the table grants forks to philosopher n
const EAT_SIG: QSignal = QSignal(4);
/// Published: philosopher n put its forks down
const DONE_SIG: QSignal = QSignal(5);
const MAX_PUB_SIG: u16 = 6;
/// Posted to the table: philosopher n wants to eat
const HUNGRY_SIG: QSignal = QSignal(6);
const TIMEOUT_SIG: QSignal = QSignal(7);

const TABLE_PRIO: u8 = N_PHILO + 1;
const TICK_HZ: u32 = 100;

fn philo_prio(n: u8) -> u8 {
    n + 1
}

fn left(n: u8) -> u8 {
    n
}

fn right(n: u8) -> u8 {
    (n + 1) % N_PHILO
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhiloState {
    Top,
    Thinking,
    Hungry,
    Eating,
}

/// Philosopher active object
struct Philosopher {
    hsm: QHsm<PhiloState>,
    id: u8,
    timeout: Option<QTimeEvt>,
}

impl Philosopher {
    fn new(id: u8) -> Self {
        Self {
            hsm: QHsm::new(),
            id,
            timeout: None,
        }
    }

    fn arm(&self, ctx: &ActiveContext<u8>, ticks: u32) {
        if let Some(te) = &self.timeout {
            ctx.arm(te, ticks, 0);
        }
    }

    fn think_ticks(&self) -> u32 {
        20 + 7 * u32::from(self.id)
    }

    fn eat_ticks(&self) -> u32 {
        15 + 3 * u32::from(self.id)
    }
}

impl QStateMachine for Philosopher {
    type State = PhiloState;
    type Payload = u8;
    type Context = ActiveContext<u8>;

    const TOP: PhiloState = PhiloState::Top;

    fn hsm(&self) -> &QHsm<PhiloState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<PhiloState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, u8>>, ctx: &ActiveContext<u8>) -> QStateReturn<PhiloState> {
        self.timeout = Some(ctx.time_evt(TIMEOUT_SIG, 0));
        ctx.subscribe(EAT_SIG);
        QStateReturn::Tran(PhiloState::Thinking)
    }

    fn handle(&mut self, state: PhiloState, e: &Evt<'_, u8>, ctx: &ActiveContext<u8>) -> QStateReturn<PhiloState> {
        use PhiloState::*;

        match (state, e.sig()) {
            (Thinking, QSignal::ENTRY) => {
                println!("Philosopher {} is thinking", self.id);
                self.arm(ctx, self.think_ticks());
                QStateReturn::Handled
            }
            (Thinking, TIMEOUT_SIG) => QStateReturn::Tran(Hungry),
            (Thinking, _) => QStateReturn::Super(Top),

            (Hungry, QSignal::ENTRY) => {
                println!("Philosopher {} is hungry", self.id);
                ctx.post(TABLE_PRIO, ctx.new_evt(HUNGRY_SIG, self.id));
                QStateReturn::Handled
            }
            (Hungry, EAT_SIG) if e.payload() == Some(&self.id) => QStateReturn::Tran(Eating),
            (Hungry, _) => QStateReturn::Super(Top),

            (Eating, QSignal::ENTRY) => {
                println!("Philosopher {} is eating", self.id);
                self.arm(ctx, self.eat_ticks());
                QStateReturn::Handled
            }
            (Eating, QSignal::EXIT) => {
                ctx.publish(ctx.new_evt(DONE_SIG, self.id));
                QStateReturn::Handled
            }
            (Eating, TIMEOUT_SIG) => QStateReturn::Tran(Thinking),
            (Eating, _) => QStateReturn::Super(Top),

            (Top, _) => QStateReturn::Ignored,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TableState {
    Top,
    Serving,
}

/// Table active object - manages fork allocation
struct Table {
    hsm: QHsm<TableState>,
    /// Fork availability (true = available)
    forks: [bool; N_PHILO as usize],
    /// Philosophers waiting for forks
    hungry: [bool; N_PHILO as usize],
    meals: u32,
    max_meals: Option<u32>,
}

impl Table {
    fn new(max_meals: Option<u32>) -> Self {
        Self {
            hsm: QHsm::new(),
            forks: [true; N_PHILO as usize],
            hungry: [false; N_PHILO as usize],
            meals: 0,
            max_meals,
        }
    }

    fn can_eat(&self, n: u8) -> bool {
        self.forks[usize::from(left(n))] && self.forks[usize::from(right(n))]
    }

    fn set_forks(&mut self, n: u8, free: bool) {
        self.forks[usize::from(left(n))] = free;
        self.forks[usize::from(right(n))] = free;
    }

    /// Hands both forks to `n` and announces it.
    fn serve(&mut self, n: u8, ctx: &ActiveContext<u8>) {
        self.set_forks(n, false);
        self.hungry[usize::from(n)] = false;
        ctx.publish(ctx.new_evt(EAT_SIG, n));
    }

    fn print_forks(&self) {
        let forks: String = self.forks.iter().map(|&free| if free { '.' } else { 'x' }).collect();
        println!("Table: forks [{}], {} meals served", forks, self.meals);
    }
}

impl QStateMachine for Table {
    type State = TableState;
    type Payload = u8;
    type Context = ActiveContext<u8>;

    const TOP: TableState = TableState::Top;

    fn hsm(&self) -> &QHsm<TableState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<TableState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, u8>>, ctx: &ActiveContext<u8>) -> QStateReturn<TableState> {
        ctx.subscribe(DONE_SIG);
        QStateReturn::Tran(TableState::Serving)
    }

    fn handle(&mut self, state: TableState, e: &Evt<'_, u8>, ctx: &ActiveContext<u8>) -> QStateReturn<TableState> {
        match (state, e.sig(), e.payload().copied()) {
            (TableState::Serving, HUNGRY_SIG, Some(n)) if n < N_PHILO => {
                if self.can_eat(n) {
                    self.serve(n, ctx);
                } else {
                    self.hungry[usize::from(n)] = true;
                }
                QStateReturn::Handled
            }
            (TableState::Serving, DONE_SIG, Some(n)) if n < N_PHILO => {
                self.set_forks(n, true);
                self.meals += 1;
                self.print_forks();
                if self.max_meals.is_some_and(|max| self.meals >= max) {
                    ctx.qf().stop();
                    return QStateReturn::Handled;
                }

                let left_neighbour = (n + N_PHILO - 1) % N_PHILO;
                for m in [left_neighbour, right(n)] {
                    if self.hungry[usize::from(m)] && self.can_eat(m) {
                        self.serve(m, ctx);
                    }
                }
                QStateReturn::Handled
            }
            (TableState::Serving, _, _) => QStateReturn::Super(TableState::Top),
            (TableState::Top, _, _) => QStateReturn::Ignored,
        }
    }
}

fn run(max_meals: Option<u32>) -> Result<(), PosixError> {
    let qf = QF::<u8>::new(
        QfConfig::builder()
            .name("dpp")
            .max_active(TABLE_PRIO)
            .max_pub_signal(MAX_PUB_SIG)
            .event_pool(32, 1)
            .build(),
    );
    let kernel = PosixKernel::new(qf);

    kernel.start(TABLE_PRIO, 16, Box::new(Table::new(max_meals)), None)?;
    for n in 0..N_PHILO {
        kernel.start(philo_prio(n), 8, Box::new(Philosopher::new(n)), None)?;
    }
    kernel.start_ticker(0, ClockTick::new(TICK_HZ))?;
    kernel.run()
}

fn main() -> ExitCode {
    println!("QP Framework - Dining Philosophers on the POSIX port\n");

    let max_meals = env::args().nth(1).and_then(|arg| arg.parse().ok());
    match run(max_meals) {
        Ok(()) => {
            println!("\nDinner is over");
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("dpp: {err}");
            ExitCode::FAILURE
        }
    }
}
