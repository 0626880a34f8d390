//! Declarative macros for ergonomic effect construction.
//!
//! These macros reduce boilerplate when creating `Effect` variants for
//! event persistence, notification delivery, and delayed actions.

/// Create an `Effect::EventStore` with `AppendEvents` operation.
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::append_events;
///
/// append_events! {
///     store: env.event_store,
///     stream: env.stream_id.as_str(),
///     expected_version: None,
///     events: vec![serialized_event],
///     on_success: |_version| None,
///     on_error: |error| Some(RegistrationAction::StorageFailed { error: error.to_string() })
/// }
/// ```
#[macro_export]
macro_rules! append_events {
    (
        store: $store:expr,
        stream: $stream:expr,
        expected_version: $expected:expr,
        events: $events:expr,
        on_success: |$success_param:ident| $success_body:expr,
        on_error: |$error_param:ident| $error_body:expr
    ) => {
        $crate::effect::Effect::EventStore($crate::effect::EventStoreOperation::AppendEvents {
            event_store: ::std::sync::Arc::clone(&$store),
            stream_id: $crate::stream::StreamId::new($stream),
            expected_version: $expected,
            events: $events,
            on_success: ::std::boxed::Box::new(move |$success_param| $success_body),
            on_error: ::std::boxed::Box::new(move |$error_param| $error_body),
        })
    };
}

/// Create an `Effect::Notify` for fire-and-forget delivery.
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::notify;
///
/// notify! {
///     sink: env.notifications,
///     notice: Notice::new(user_id.to_string(), "registration.confirmed", payload)
/// }
/// ```
#[macro_export]
macro_rules! notify {
    (
        sink: $sink:expr,
        notice: $notice:expr
    ) => {
        $crate::effect::Effect::Notify($crate::effect::NotifyOperation {
            sink: ::std::sync::Arc::clone(&$sink),
            notice: $notice,
        })
    };
}

/// Create an `Effect::Future` from an async block.
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::async_effect;
///
/// async_effect! {
///     let session = gateway.authorize(registration).await;
///     Some(RegistrationAction::PaymentSessionOpened { session })
/// }
/// ```
#[macro_export]
macro_rules! async_effect {
    ($($body:tt)*) => {
        $crate::effect::Effect::Future(
            ::std::boxed::Box::pin(async move { $($body)* })
        )
    };
}

/// Create an `Effect::Delay` for scheduling delayed actions.
///
/// # Example
///
/// ```rust,ignore
/// use turnstile_core::delay;
/// use std::time::Duration;
///
/// delay! {
///     duration: Duration::from_secs(15 * 60),
///     action: RegistrationAction::Expire { registration_id }
/// }
/// ```
#[macro_export]
macro_rules! delay {
    (
        duration: $duration:expr,
        action: $action:expr
    ) => {
        $crate::effect::Effect::Delay {
            duration: $duration,
            action: ::std::boxed::Box::new($action),
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::effect::Effect;
    use std::time::Duration;

    #[derive(Clone, Debug)]
    enum TestAction {
        AsyncResult { value: i32 },
        TimeoutExpired,
    }

    #[test]
    fn test_async_effect_macro() {
        let effect = async_effect! {
            Some(TestAction::AsyncResult { value: 42 })
        };

        assert!(matches!(effect, Effect::Future(_)));
    }

    #[test]
    fn test_delay_macro() {
        let effect = delay! {
            duration: Duration::from_secs(30),
            action: TestAction::TimeoutExpired
        };

        assert!(matches!(effect, Effect::Delay { .. }));
    }

    // append_events! and notify! are exercised in integration tests where
    // real EventStore and NotificationSink implementations are available.
}
