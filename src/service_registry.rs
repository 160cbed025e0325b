//! Process-wide service container.
//!
//! Descriptors are collected on a [`ServiceRegistryBuilder`] and frozen by
//! [`ServiceRegistryBuilder::build`]. Registering the same identity twice is
//! rejected with [`RegistryError::DuplicateRegistration`]; nothing is ever
//! overwritten. The only late addition allowed after `build` is a one-shot
//! [`ServiceRegistry::publish`] for singletons that are constructed during
//! startup (the repository handle).

use std::{
    any::{type_name, Any, TypeId},
    cell::RefCell,
    collections::HashMap,
    sync::Arc,
};

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceLifetime {
    Singleton,
    Transient,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("{0} needs to be registered before it can be resolved")]
    UnregisteredService(&'static str),
    #[error("{0} is already registered")]
    DuplicateRegistration(&'static str),
    #[error("circular dependency detected while resolving {0}")]
    CircularDependency(&'static str),
}

type ErasedInstance = Box<dyn Any + Send + Sync>;
type ServiceFactory<T> =
    Arc<dyn Fn(&ServiceRegistry) -> Result<Arc<T>, RegistryError> + Send + Sync>;

struct ServiceDescriptor {
    service_name: &'static str,
    lifetime: ServiceLifetime,
    factory: ErasedInstance,
    // Also serves as the per-identity lock for first resolution.
    singleton: Mutex<Option<ErasedInstance>>,
}

struct PublishedService {
    service_name: &'static str,
    instance: ErasedInstance,
}

thread_local! {
    static RESOLUTION_STACK: RefCell<Vec<TypeId>> = const { RefCell::new(Vec::new()) };
}

struct ResolutionGuard {
    identity: TypeId,
}

impl ResolutionGuard {
    fn enter(identity: TypeId, service_name: &'static str) -> Result<Self, RegistryError> {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if stack.contains(&identity) {
                return Err(RegistryError::CircularDependency(service_name));
            }
            stack.push(identity);
            Ok(Self { identity })
        })
    }
}

impl Drop for ResolutionGuard {
    fn drop(&mut self) {
        RESOLUTION_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            if let Some(position) = stack.iter().rposition(|identity| *identity == self.identity) {
                stack.remove(position);
            }
        });
    }
}

#[derive(Default)]
pub struct ServiceRegistryBuilder {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_singleton<T, F>(&mut self, factory: F) -> Result<&mut Self, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceRegistry) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Singleton, factory)
    }

    pub fn register_transient<T, F>(&mut self, factory: F) -> Result<&mut Self, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceRegistry) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        self.register(ServiceLifetime::Transient, factory)
    }

    pub fn register<T, F>(
        &mut self,
        lifetime: ServiceLifetime,
        factory: F,
    ) -> Result<&mut Self, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
        F: Fn(&ServiceRegistry) -> Result<Arc<T>, RegistryError> + Send + Sync + 'static,
    {
        let identity = TypeId::of::<T>();
        let service_name = type_name::<T>();
        if self.descriptors.contains_key(&identity) {
            return Err(RegistryError::DuplicateRegistration(service_name));
        }

        let factory: ServiceFactory<T> = Arc::new(factory);
        self.descriptors.insert(
            identity,
            ServiceDescriptor {
                service_name,
                lifetime,
                factory: Box::new(factory),
                singleton: Mutex::new(None),
            },
        );
        Ok(self)
    }

    pub fn build(self) -> ServiceRegistry {
        tracing::debug!(
            target: "registry",
            services = self.descriptors.len(),
            "service registry built"
        );
        ServiceRegistry {
            descriptors: self.descriptors,
            published: Mutex::new(HashMap::new()),
        }
    }
}

pub struct ServiceRegistry {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
    published: Mutex<HashMap<TypeId, PublishedService>>,
}

impl ServiceRegistry {
    pub fn builder() -> ServiceRegistryBuilder {
        ServiceRegistryBuilder::new()
    }

    pub fn contains<T>(&self) -> bool
    where
        T: ?Sized + 'static,
    {
        let identity = TypeId::of::<T>();
        self.descriptors.contains_key(&identity) || self.published.lock().contains_key(&identity)
    }

    pub fn lifetime_of<T>(&self) -> Option<ServiceLifetime>
    where
        T: ?Sized + 'static,
    {
        let identity = TypeId::of::<T>();
        if let Some(descriptor) = self.descriptors.get(&identity) {
            return Some(descriptor.lifetime);
        }
        self.published
            .lock()
            .contains_key(&identity)
            .then_some(ServiceLifetime::Singleton)
    }

    /// Resolves `T`, constructing it according to its registered lifetime.
    ///
    /// Concurrent first resolutions of the same singleton block on the
    /// descriptor lock, so the factory runs at most once per identity.
    ///
    /// Cycle detection only sees the calling thread's resolution chain. If
    /// two threads each start on a different singleton of the same cycle,
    /// both wait on the other's descriptor lock and neither reports
    /// [`RegistryError::CircularDependency`]. Cycles are expected to be
    /// caught by a single-threaded resolution at startup.
    pub fn resolve<T>(&self) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let identity = TypeId::of::<T>();
        let service_name = type_name::<T>();

        let Some(descriptor) = self.descriptors.get(&identity) else {
            if let Some(published) = self.published.lock().get(&identity) {
                return Ok(downcast_instance::<T>(&published.instance, published.service_name));
            }
            tracing::error!(
                target: "registry",
                service = service_name,
                "resolving a service that was never registered"
            );
            return Err(RegistryError::UnregisteredService(service_name));
        };

        let _resolving = ResolutionGuard::enter(identity, service_name)?;
        match descriptor.lifetime {
            ServiceLifetime::Transient => self.invoke_factory::<T>(descriptor),
            ServiceLifetime::Singleton => {
                let mut cached = descriptor.singleton.lock();
                if let Some(instance) = cached.as_ref() {
                    return Ok(downcast_instance::<T>(instance, descriptor.service_name));
                }
                let instance = self.invoke_factory::<T>(descriptor)?;
                *cached = Some(Box::new(Arc::clone(&instance)));
                tracing::debug!(
                    target: "registry",
                    service = descriptor.service_name,
                    "singleton constructed"
                );
                Ok(instance)
            }
        }
    }

    /// Publishes a singleton built outside the registry. Each identity can be
    /// published once and never if it already has a descriptor.
    pub fn publish<T>(&self, instance: Arc<T>) -> Result<(), RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let identity = TypeId::of::<T>();
        let service_name = type_name::<T>();
        if self.descriptors.contains_key(&identity) {
            return Err(RegistryError::DuplicateRegistration(service_name));
        }

        let mut published = self.published.lock();
        if published.contains_key(&identity) {
            return Err(RegistryError::DuplicateRegistration(service_name));
        }
        published.insert(
            identity,
            PublishedService {
                service_name,
                instance: Box::new(instance),
            },
        );
        tracing::info!(target: "registry", service = service_name, "singleton published");
        Ok(())
    }

    fn invoke_factory<T>(&self, descriptor: &ServiceDescriptor) -> Result<Arc<T>, RegistryError>
    where
        T: ?Sized + Send + Sync + 'static,
    {
        let factory = descriptor
            .factory
            .downcast_ref::<ServiceFactory<T>>()
            .expect("service factory is keyed by the TypeId of its own service type");
        factory(self)
    }
}

fn downcast_instance<T>(instance: &ErasedInstance, service_name: &'static str) -> Arc<T>
where
    T: ?Sized + Send + Sync + 'static,
{
    match instance.downcast_ref::<Arc<T>>() {
        Some(instance) => Arc::clone(instance),
        None => panic!("cached instance for {service_name} does not match its TypeId"),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
        time::Duration,
    };

    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct EnglishGreeter;

    impl Greeter for EnglishGreeter {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    struct Counter {
        value: usize,
    }

    struct Consumer {
        greeter: Arc<dyn Greeter>,
    }

    #[test]
    fn singleton_resolves_to_the_same_instance() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<Counter, _>(|_| Ok(Arc::new(Counter { value: 7 })))
            .expect("register counter");
        let registry = builder.build();

        let first = registry.resolve::<Counter>().expect("first resolve");
        let second = registry.resolve::<Counter>().expect("second resolve");
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.value, 7);
    }

    #[test]
    fn transient_resolves_to_a_new_instance_every_time() {
        let constructed = Arc::new(AtomicUsize::new(0));
        let constructed_in_factory = Arc::clone(&constructed);
        let mut builder = ServiceRegistry::builder();
        builder
            .register_transient::<Counter, _>(move |_| {
                let value = constructed_in_factory.fetch_add(1, Ordering::SeqCst);
                Ok(Arc::new(Counter { value }))
            })
            .expect("register counter");
        let registry = builder.build();

        let first = registry.resolve::<Counter>().expect("first resolve");
        let second = registry.resolve::<Counter>().expect("second resolve");
        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(constructed.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn resolving_unregistered_service_fails_loudly() {
        let registry = ServiceRegistry::builder().build();
        let error = registry.resolve::<Counter>().err().expect("must fail");
        assert!(matches!(error, RegistryError::UnregisteredService(name) if name.ends_with("Counter")));
    }

    #[test]
    fn duplicate_registration_is_rejected_and_keeps_first_descriptor() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<Counter, _>(|_| Ok(Arc::new(Counter { value: 1 })))
            .expect("first registration");
        let error = builder
            .register_transient::<Counter, _>(|_| Ok(Arc::new(Counter { value: 2 })))
            .err()
            .expect("second registration must fail");
        assert!(matches!(error, RegistryError::DuplicateRegistration(_)));

        let registry = builder.build();
        assert_eq!(registry.lifetime_of::<Counter>(), Some(ServiceLifetime::Singleton));
        assert_eq!(registry.resolve::<Counter>().expect("resolve").value, 1);
    }

    #[test]
    fn trait_object_services_resolve_through_their_dyn_identity() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<dyn Greeter, _>(|_| Ok(Arc::new(EnglishGreeter)))
            .expect("register greeter")
            .register_transient::<Consumer, _>(|registry| {
                Ok(Arc::new(Consumer {
                    greeter: registry.resolve::<dyn Greeter>()?,
                }))
            })
            .expect("register consumer");
        let registry = builder.build();

        let consumer = registry.resolve::<Consumer>().expect("resolve consumer");
        assert_eq!(consumer.greeter.greet(), "hello");
    }

    #[test]
    fn factory_failure_for_missing_dependency_propagates() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_transient::<Consumer, _>(|registry| {
                Ok(Arc::new(Consumer {
                    greeter: registry.resolve::<dyn Greeter>()?,
                }))
            })
            .expect("register consumer");
        let registry = builder.build();

        assert!(matches!(
            registry.resolve::<Consumer>(),
            Err(RegistryError::UnregisteredService(_))
        ));
    }

    #[test]
    fn self_referencing_factory_reports_circular_dependency() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<Counter, _>(|registry| {
                let inner = registry.resolve::<Counter>()?;
                Ok(Arc::new(Counter {
                    value: inner.value + 1,
                }))
            })
            .expect("register counter");
        let registry = builder.build();

        assert!(matches!(
            registry.resolve::<Counter>(),
            Err(RegistryError::CircularDependency(_))
        ));
        // Resolution stack is unwound, so a retry fails the same way instead of deadlocking.
        assert!(matches!(
            registry.resolve::<Counter>(),
            Err(RegistryError::CircularDependency(_))
        ));
    }

    #[test]
    fn publish_makes_instance_resolvable_once() {
        let registry = ServiceRegistry::builder().build();
        assert!(!registry.contains::<dyn Greeter>());

        let greeter: Arc<dyn Greeter> = Arc::new(EnglishGreeter);
        registry.publish(Arc::clone(&greeter)).expect("publish greeter");
        assert!(registry.contains::<dyn Greeter>());
        assert_eq!(
            registry.lifetime_of::<dyn Greeter>(),
            Some(ServiceLifetime::Singleton)
        );

        let resolved = registry.resolve::<dyn Greeter>().expect("resolve greeter");
        assert!(Arc::ptr_eq(&resolved, &greeter));

        let again: Arc<dyn Greeter> = Arc::new(EnglishGreeter);
        assert!(matches!(
            registry.publish(again),
            Err(RegistryError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn publish_rejects_identity_with_descriptor() {
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<Counter, _>(|_| Ok(Arc::new(Counter { value: 1 })))
            .expect("register counter");
        let registry = builder.build();

        assert!(matches!(
            registry.publish(Arc::new(Counter { value: 2 })),
            Err(RegistryError::DuplicateRegistration(_))
        ));
    }

    #[test]
    fn concurrent_singleton_resolution_invokes_factory_once() {
        let invocations = Arc::new(AtomicUsize::new(0));
        let invocations_in_factory = Arc::clone(&invocations);
        let mut builder = ServiceRegistry::builder();
        builder
            .register_singleton::<Counter, _>(move |_| {
                invocations_in_factory.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(20));
                Ok(Arc::new(Counter { value: 42 }))
            })
            .expect("register counter");
        let registry = builder.build();

        let resolved: Vec<Arc<Counter>> = thread::scope(|scope| {
            let handles: Vec<_> = (0..8)
                .map(|_| scope.spawn(|| registry.resolve::<Counter>().expect("resolve counter")))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().expect("resolver thread panicked"))
                .collect()
        });

        assert_eq!(invocations.load(Ordering::SeqCst), 1);
        assert!(resolved.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }
}
