//! Blinky Example - A simple LED blinking application using QP framework
//!
//! One active object toggles a simulated LED on a periodic time event. The
//! cooperative kernel runs it; the idle callback sleeps for one tick period
//! and hands the tick to a `QTicker` active object.

use std::thread;
use std::time::Duration;

use qp_qf::{
    ActiveContext, Evt, QEvt, QHsm, QSignal, QStateMachine, QStateReturn, QTicker, QTimeEvt,
    QfConfig, QF,
};
use qp_qv::QvKernel;

const TIMEOUT_SIG: QSignal = QSignal(4);
const TICK_SIG: QSignal = QSignal(5);

const TICKER_PRIO: u8 = 1;
const BLINKY_PRIO: u8 = 2;

const TICK_PERIOD: Duration = Duration::from_millis(10);
/// Half a blink period, in ticks
const BLINK_TICKS: u32 = 50;
const BLINKS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlinkyState {
    Top,
    Blinking,
    Off,
    On,
    Done,
}

struct Blinky {
    hsm: QHsm<BlinkyState>,
    timeout: Option<QTimeEvt>,
    blinks: u32,
}

impl Blinky {
    fn new() -> Self {
        Self {
            hsm: QHsm::new(),
            timeout: None,
            blinks: 0,
        }
    }
}

impl QStateMachine for Blinky {
    type State = BlinkyState;
    type Payload = ();
    type Context = ActiveContext<()>;

    const TOP: BlinkyState = BlinkyState::Top;

    fn hsm(&self) -> &QHsm<BlinkyState> {
        &self.hsm
    }

    fn hsm_mut(&mut self) -> &mut QHsm<BlinkyState> {
        &mut self.hsm
    }

    fn initial(&mut self, _par: Option<&Evt<'_, ()>>, ctx: &ActiveContext<()>) -> QStateReturn<BlinkyState> {
        let te = ctx.time_evt(TIMEOUT_SIG, 0);
        ctx.arm(&te, BLINK_TICKS, BLINK_TICKS);
        self.timeout = Some(te);
        QStateReturn::Tran(BlinkyState::Off)
    }

    fn handle(&mut self, state: BlinkyState, e: &Evt<'_, ()>, ctx: &ActiveContext<()>) -> QStateReturn<BlinkyState> {
        use BlinkyState::*;

        match (state, e.sig()) {
            (Blinking, QSignal::EXIT) => {
                if let Some(te) = &self.timeout {
                    ctx.disarm(te);
                }
                QStateReturn::Handled
            }
            (Blinking, _) => QStateReturn::Super(Top),

            (Off, QSignal::ENTRY) => {
                println!("LED OFF");
                QStateReturn::Handled
            }
            (Off, TIMEOUT_SIG) => QStateReturn::Tran(On),
            (Off, _) => QStateReturn::Super(Blinking),

            (On, QSignal::ENTRY) => {
                self.blinks += 1;
                println!("LED ON  ({}/{})", self.blinks, BLINKS);
                QStateReturn::Handled
            }
            (On, TIMEOUT_SIG) if self.blinks >= BLINKS => QStateReturn::Tran(Done),
            (On, TIMEOUT_SIG) => QStateReturn::Tran(Off),
            (On, _) => QStateReturn::Super(Blinking),

            (Done, QSignal::ENTRY) => {
                println!("LED OFF");
                ctx.qf().stop();
                QStateReturn::Handled
            }
            (Done, _) => QStateReturn::Super(Top),

            (Top, _) => QStateReturn::Ignored,
        }
    }
}

fn main() {
    println!("QP Framework - Blinky on the cooperative kernel\n");

    let qf = QF::<()>::new(
        QfConfig::builder()
            .name("blinky")
            .max_active(4)
            .build(),
    );
    let ticker_qf = qf.clone();
    let mut qv = QvKernel::new(qf).with_idle(move || {
        thread::sleep(TICK_PERIOD);
        ticker_qf.post(TICKER_PRIO, QEvt::new_static(TICK_SIG));
    });

    qv.start(TICKER_PRIO, 2, Box::new(QTicker::<()>::new(0)), None);
    qv.start(BLINKY_PRIO, 4, Box::new(Blinky::new()), None);
    qv.run();

    println!("\nBlinked {} times", BLINKS);
}
